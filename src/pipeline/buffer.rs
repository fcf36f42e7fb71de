//! Pooled serialization buffers
//!
//! Call results are serialized into buffers borrowed from a bounded pool and
//! returned once the response envelope is written. Oversized buffers and
//! buffers returned to a full pool are dropped.

use bytes::BytesMut;
use parking_lot::Mutex;

use crate::config::BufferConfig;

#[derive(Debug)]
pub struct BufferPool {
    buffers: Mutex<Vec<BytesMut>>,
    max_pooled: usize,
    initial_capacity: usize,
    max_retained_bytes: usize,
}

impl BufferPool {
    pub fn new(config: &BufferConfig) -> Self {
        Self {
            buffers: Mutex::new(Vec::with_capacity(config.max_pooled)),
            max_pooled: config.max_pooled,
            initial_capacity: config.initial_capacity,
            max_retained_bytes: config.max_retained_bytes,
        }
    }

    /// Take an empty buffer, reusing a pooled one when available
    pub fn acquire(&self) -> BytesMut {
        self.buffers
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.initial_capacity))
    }

    /// Return a buffer to the pool
    pub fn release(&self, mut buffer: BytesMut) {
        if buffer.capacity() > self.max_retained_bytes {
            return;
        }
        buffer.clear();
        let mut buffers = self.buffers.lock();
        if buffers.len() < self.max_pooled {
            buffers.push(buffer);
        }
    }

    /// Buffers currently idle in the pool
    pub fn pooled(&self) -> usize {
        self.buffers.lock().len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(&BufferConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn pool(max_pooled: usize, max_retained_bytes: usize) -> BufferPool {
        BufferPool::new(&BufferConfig {
            max_pooled,
            initial_capacity: 64,
            max_retained_bytes,
        })
    }

    #[test]
    fn test_reuses_released_buffers() {
        let pool = pool(4, 1024);
        let mut buf = pool.acquire();
        buf.put_slice(b"hello");
        pool.release(buf);
        assert_eq!(pool.pooled(), 1);

        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert_eq!(pool.pooled(), 0);
    }

    #[test]
    fn test_oversized_buffers_are_dropped() {
        let pool = pool(4, 128);
        let mut buf = pool.acquire();
        buf.put_slice(&[0u8; 512]);
        pool.release(buf);
        assert_eq!(pool.pooled(), 0);
    }

    #[test]
    fn test_pool_is_bounded() {
        let pool = pool(2, 1024);
        let buffers: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        for buf in buffers {
            pool.release(buf);
        }
        assert_eq!(pool.pooled(), 2);
    }
}
