use std::ops::Range;

use crate::error::PartitionError;

/// Contiguous slice of the work list owned by one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub id: usize,
    pub total: usize,
}

impl Chunk {
    pub fn new(id: usize, total: usize) -> Result<Self, PartitionError> {
        if total == 0 {
            return Err(PartitionError::InvalidArgument("chunk_total must be > 0".into()));
        }
        if id >= total {
            return Err(PartitionError::InvalidArgument(format!(
                "chunk_id {} out of range [0, {})",
                id, total
            )));
        }
        Ok(Self { id, total })
    }

    /// Index range of this chunk in a list of `len` items
    pub fn range(&self, len: usize) -> Range<usize> {
        let size = len.div_ceil(self.total);
        let start = (self.id * size).min(len);
        let end = (start + size).min(len);
        start..end
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[self.range(items.len())]
    }
}

/// `[start, end)` of chunk `chunk_id` when `total` items are split into `chunk_total` chunks
///
/// Chunks past the end of the list are empty, not an error.
pub fn partition(
    total: usize,
    chunk_id: usize,
    chunk_total: usize,
) -> Result<Range<usize>, PartitionError> {
    Ok(Chunk::new(chunk_id, chunk_total)?.range(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_covers_exactly_once() {
        for total in 0..64 {
            for chunk_total in 1..20 {
                let mut seen = vec![0u32; total];
                let mut last_end = 0;
                for id in 0..chunk_total {
                    let range = partition(total, id, chunk_total).unwrap();
                    assert!(range.start <= range.end);
                    if !range.is_empty() {
                        assert_eq!(range.start, last_end, "gap at {total}/{chunk_total}");
                        last_end = range.end;
                    }
                    for i in range {
                        seen[i] += 1;
                    }
                }
                assert!(seen.iter().all(|&n| n == 1), "{total}/{chunk_total}: {seen:?}");
            }
        }
    }

    #[test]
    fn test_partition_301_by_30() {
        assert_eq!(partition(301, 0, 30).unwrap(), 0..11);
        assert_eq!(partition(301, 1, 30).unwrap(), 11..22);
        assert_eq!(partition(301, 27, 30).unwrap(), 297..301);
        // 301 items in chunks of 11 are exhausted after chunk 27
        assert!(partition(301, 28, 30).unwrap().is_empty());
        assert!(partition(301, 29, 30).unwrap().is_empty());
    }

    #[test]
    fn test_partition_300_by_30() {
        assert_eq!(partition(300, 0, 30).unwrap(), 0..10);
        assert_eq!(partition(300, 29, 30).unwrap(), 290..300);
    }

    #[test]
    fn test_partition_empty_tail_chunks() {
        for id in 0..5 {
            assert_eq!(partition(5, id, 10).unwrap(), id..id + 1);
        }
        for id in 5..10 {
            assert!(partition(5, id, 10).unwrap().is_empty());
        }
    }

    #[test]
    fn test_partition_invalid() {
        assert!(matches!(partition(10, 0, 0), Err(PartitionError::InvalidArgument(_))));
        assert!(matches!(partition(10, 3, 3), Err(PartitionError::InvalidArgument(_))));
    }

    #[test]
    fn test_chunk_slice() {
        let items: Vec<u32> = (0..7).collect();
        let chunk = Chunk::new(1, 3).unwrap();
        assert_eq!(chunk.slice(&items), &[3, 4, 5]);
        assert_eq!(Chunk::new(2, 3).unwrap().slice(&items), &[6]);
    }
}
