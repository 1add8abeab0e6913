//! Seam to the numeric-buffer host (the simulator / compute layer).
//!
//! The dataframe treats the host as opaque: it creates byte buffers, reads
//! them back, writes them, and deletes them. Typed helpers convert between
//! little-endian bytes and `f32`/`u32`/`i32` slices through a caller-owned
//! staging vector so repeated transfers do not reallocate.

use crate::error::{DataframeError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub trait BufferElement: Copy + Default + Send + Sync + 'static {
    const BYTES: usize = 4;
    fn write_le(self, out: &mut [u8]);
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_buffer_element {
    ($($t:ty),*) => {$(
        impl BufferElement for $t {
            fn write_le(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }
            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(bytes);
                <$t>::from_le_bytes(raw)
            }
        }
    )*};
}

impl_buffer_element!(f32, u32, i32);

#[async_trait]
pub trait BufferHandle: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
    fn byte_length(&self) -> usize;
    async fn read_bytes(&self, dst: &mut [u8]) -> Result<()>;
    async fn write_bytes(&self, src: &[u8]) -> Result<()>;
    async fn delete(&self) -> Result<()>;
}

pub type SharedBuffer = Arc<dyn BufferHandle>;

#[async_trait]
pub trait BufferHost: Send + Sync {
    async fn create_buffer(&self, byte_length: usize, name: &str) -> Result<SharedBuffer>;
    fn versions(&self) -> &VersionTable;
}

/// Per-buffer version counters plus a global tick, bumped after buffer swaps
/// so downstream consumers can detect stale reads.
#[derive(Debug, Default)]
pub struct VersionTable {
    buffers: DashMap<String, u64>,
    tick: AtomicU64,
}

impl VersionTable {
    pub fn bump(&self, name: &str) -> u64 {
        let mut entry = self.buffers.entry(name.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn bump_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn buffer(&self, name: &str) -> u64 {
        self.buffers.get(name).map(|v| *v).unwrap_or(0)
    }

    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Relaxed)
    }
}

pub async fn read_typed<T: BufferElement>(
    handle: &dyn BufferHandle,
    dst: &mut [T],
    staging: &mut Vec<u8>,
) -> Result<()> {
    let byte_len = dst.len() * T::BYTES;
    if byte_len != handle.byte_length() {
        return Err(DataframeError::mismatched(
            format!("read of {}", handle.name()),
            handle.byte_length(),
            byte_len,
        ));
    }
    staging.clear();
    staging.resize(byte_len, 0);
    handle.read_bytes(staging).await?;
    for (slot, chunk) in dst.iter_mut().zip(staging.chunks_exact(T::BYTES)) {
        *slot = T::read_le(chunk);
    }
    Ok(())
}

pub async fn write_typed<T: BufferElement>(
    handle: &dyn BufferHandle,
    src: &[T],
    staging: &mut Vec<u8>,
) -> Result<()> {
    encode(src, staging);
    if staging.len() != handle.byte_length() {
        return Err(DataframeError::mismatched(
            format!("write of {}", handle.name()),
            handle.byte_length(),
            staging.len(),
        ));
    }
    handle.write_bytes(staging).await
}

/// Allocates a buffer sized for `src` and uploads it.
pub async fn create_typed<T: BufferElement>(
    host: &dyn BufferHost,
    name: &str,
    src: &[T],
    staging: &mut Vec<u8>,
) -> Result<SharedBuffer> {
    let handle = host.create_buffer(src.len() * T::BYTES, name).await?;
    if let Err(err) = write_typed(handle.as_ref(), src, staging).await {
        handle.delete().await?;
        return Err(err);
    }
    Ok(handle)
}

fn encode<T: BufferElement>(src: &[T], staging: &mut Vec<u8>) {
    staging.clear();
    staging.resize(src.len() * T::BYTES, 0);
    for (value, chunk) in src.iter().zip(staging.chunks_exact_mut(T::BYTES)) {
        value.write_le(chunk);
    }
}

type Arena = Arc<DashMap<u64, Vec<u8>>>;

/// Host that keeps buffers in process memory. Used by the CLI and tests.
#[derive(Debug, Default)]
pub struct MemoryBufferHost {
    arena: Arena,
    next_id: AtomicU64,
    versions: VersionTable,
    fail_io: Arc<AtomicBool>,
}

impl MemoryBufferHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffers created and not yet deleted.
    pub fn live_buffers(&self) -> usize {
        self.arena.len()
    }

    /// Makes every subsequent read and write fail, to exercise error paths.
    pub fn set_failing(&self, failing: bool) {
        self.fail_io.store(failing, Ordering::Relaxed);
    }
}

#[async_trait]
impl BufferHost for MemoryBufferHost {
    async fn create_buffer(&self, byte_length: usize, name: &str) -> Result<SharedBuffer> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.arena.insert(id, vec![0u8; byte_length]);
        Ok(Arc::new(MemoryBuffer {
            id,
            name: name.to_string(),
            byte_length,
            arena: Arc::clone(&self.arena),
            fail_io: Arc::clone(&self.fail_io),
        }))
    }

    fn versions(&self) -> &VersionTable {
        &self.versions
    }
}

#[derive(Debug)]
pub struct MemoryBuffer {
    id: u64,
    name: String,
    byte_length: usize,
    arena: Arena,
    fail_io: Arc<AtomicBool>,
}

impl MemoryBuffer {
    fn check_io(&self) -> Result<()> {
        if self.fail_io.load(Ordering::Relaxed) {
            return Err(DataframeError::BufferIo(format!(
                "host unavailable for {}",
                self.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BufferHandle for MemoryBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn byte_length(&self) -> usize {
        self.byte_length
    }

    async fn read_bytes(&self, dst: &mut [u8]) -> Result<()> {
        self.check_io()?;
        let data = self
            .arena
            .get(&self.id)
            .ok_or_else(|| DataframeError::BufferIo(format!("{} was deleted", self.name)))?;
        let n = dst.len().min(data.len());
        dst[..n].copy_from_slice(&data[..n]);
        Ok(())
    }

    async fn write_bytes(&self, src: &[u8]) -> Result<()> {
        self.check_io()?;
        let mut data = self
            .arena
            .get_mut(&self.id)
            .ok_or_else(|| DataframeError::BufferIo(format!("{} was deleted", self.name)))?;
        let n = src.len().min(data.len());
        data[..n].copy_from_slice(&src[..n]);
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        self.arena.remove(&self.id);
        Ok(())
    }
}
