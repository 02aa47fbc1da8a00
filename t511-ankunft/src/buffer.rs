//! Fixed-capacity storage for one source's response.

use std::io::Read;

use crate::errors::FetchError;

/// Holds at most `limit` bytes of response body.
///
/// Each source owns exactly one of these, so peak memory use is bounded by
/// the number of sources times the limit.
#[derive(Debug)]
pub struct ResponseBuffer {
    data: Vec<u8>,
    limit: usize,
}

impl ResponseBuffer {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            data: Vec::with_capacity(limit.saturating_add(1)),
            limit
        }
    }
    pub fn limit(&self) -> usize {
        self.limit
    }
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn clear(&mut self) {
        self.data.clear();
    }
    /// Replaces the contents with everything `reader` yields.
    ///
    /// Reads at most one byte past the limit. If the body turns out to be
    /// larger than the limit, the buffer is left empty and
    /// `FetchError::Oversize` returned.
    pub fn fill_from<R: Read>(&mut self, reader: R) -> Result<usize, FetchError> {
        self.data.clear();
        let ret = reader.take(self.limit as u64 + 1).read_to_end(&mut self.data);
        if let Err(e) = ret {
            self.data.clear();
            return Err(e.into());
        }
        if self.data.len() > self.limit {
            self.data.clear();
            return Err(FetchError::Oversize { limit: self.limit });
        }
        Ok(self.data.len())
    }
}
