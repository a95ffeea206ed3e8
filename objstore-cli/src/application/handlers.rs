use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use objstore_core::content_store::fs::FsContentStore;
use objstore_core::content_store::memory::MemoryStore;
use objstore_core::content_store::ContentStore;
use objstore_core::error::Result;
use objstore_core::ignore::{Decision, DirOverride, IgnoreArena};
use objstore_core::reader::Whence;
use objstore_core::writer::NO_PREFIX;
use objstore_core::{ObjectId, ObjectReader, ObjectWriter, WriterOptions};

pub fn store_from_args(store_dir: &Path, memory: bool) -> Result<Arc<dyn ContentStore>> {
    if memory {
        Ok(Arc::new(MemoryStore::new()))
    } else {
        Ok(Arc::new(FsContentStore::open(store_dir)?))
    }
}

pub fn handle_write(
    store: Arc<dyn ContentStore>,
    input: Option<PathBuf>,
    prefix: Option<char>,
    compressor: Option<String>,
    splitter: String,
    async_writes: usize,
) -> Result<()> {
    let mut writer = ObjectWriter::new(
        store,
        WriterOptions {
            description: String::new(),
            prefix: prefix.unwrap_or(NO_PREFIX),
            compressor,
            async_writes,
            splitter_name: splitter,
            cancel_token: None,
        },
    )?;

    let mut buf = [0u8; 64 * 1024];
    match input {
        Some(path) => {
            let mut file = std::fs::File::open(path)?;
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                writer.write(&buf[..n])?;
            }
        }
        None => {
            let stdin = std::io::stdin();
            let mut lock = stdin.lock();
            loop {
                let n = lock.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                writer.write(&buf[..n])?;
            }
        }
    }

    let id = writer.result()?;
    println!("{}", id.render());
    Ok(())
}

pub fn handle_read(
    store: Arc<dyn ContentStore>,
    id: String,
    out: Option<PathBuf>,
    offset: Option<i64>,
    length: Option<u64>,
) -> Result<()> {
    let object_id = ObjectId::parse(&id)?;
    let mut reader = ObjectReader::open(store, &object_id)?;
    if let Some(off) = offset {
        reader.seek(off, Whence::Start)?;
    }

    let mut sink: Box<dyn Write> = match &out {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(std::io::stdout()),
    };

    let mut buf = [0u8; 64 * 1024];
    let mut remaining = length;
    loop {
        let want = match remaining {
            Some(0) => break,
            Some(r) => buf.len().min(r as usize),
            None => buf.len(),
        };
        let n = reader.read(&mut buf[..want])?;
        if n == 0 {
            break;
        }
        sink.write_all(&buf[..n])?;
        if let Some(r) = remaining.as_mut() {
            *r -= n as u64;
        }
    }
    Ok(())
}

pub fn handle_verify(store: Arc<dyn ContentStore>, id: String) -> Result<()> {
    let object_id = ObjectId::parse(&id)?;
    let addrs = objstore_core::walker::verify_object(&store, &object_id)?;
    for addr in &addrs {
        store.info(addr)?;
    }
    eprintln!("verify: OK ({} backing blobs)", addrs.len());
    Ok(())
}

#[cfg(unix)]
fn device_of(path: &Path) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    std::fs::symlink_metadata(path).ok().map(|m| m.dev())
}

#[cfg(not(unix))]
fn device_of(_path: &Path) -> Option<u64> {
    None
}

pub fn handle_ignore_preview(
    root: PathBuf,
    dot_ignore_filenames: Vec<String>,
    max_file_size: Option<u64>,
    rules: Vec<String>,
    cross_filesystem: Option<bool>,
) -> Result<()> {
    let mut arena = IgnoreArena::new();
    let root_ctx = arena.root(
        DirOverride {
            extra_dot_ignore_filenames: dot_ignore_filenames,
            max_file_size,
            extra_rules: rules,
            cross_filesystem,
            ..Default::default()
        },
        device_of(&root),
    );

    let mut ctx_for_dir: HashMap<PathBuf, usize> = HashMap::new();
    ctx_for_dir.insert(root.clone(), root_ctx);

    let mut entries = walkdir::WalkDir::new(&root).min_depth(1).into_iter();
    while let Some(entry) = entries.next() {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        let path = entry.path();
        let parent = path.parent().unwrap_or(&root);
        let parent_ctx = *ctx_for_dir.get(parent).unwrap_or(&root_ctx);
        let rel = path
            .strip_prefix(&root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let is_dir = entry.file_type().is_dir();
        let size = entry.metadata().ok().map(|m| m.len());
        let decision = arena.classify(parent_ctx, &rel, is_dir, size, device_of(path));

        println!(
            "{}\t{}",
            if decision == Decision::Included {
                "keep"
            } else {
                "skip"
            },
            rel
        );

        if is_dir {
            if decision == Decision::Excluded {
                entries.skip_current_dir();
                continue;
            }
            let child_ctx = arena.child(parent_ctx, path, DirOverride::default());
            ctx_for_dir.insert(path.to_path_buf(), child_ctx);
        }
    }
    Ok(())
}
