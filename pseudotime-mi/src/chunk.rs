use anyhow::{bail, Error};
use std::ops::Range;

/// Half-open range `[start, end)` of gene indices handled by one worker
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkRange {
    pub start: usize,
    pub end: usize,
}

// ceil(i * total / n_chunks) without going through floating point
fn cut_point(i: usize, total_genes: usize, n_chunks: usize) -> usize {
    let n = n_chunks as u128;
    ((i as u128 * total_genes as u128 + n - 1) / n) as usize
}

/// The `n_chunks + 1` evenly spaced cut points from `0` to `total_genes`, rounded up. Chunk sizes
/// differ by at most one gene.
pub fn chunk_bounds(total_genes: usize, n_chunks: usize) -> Result<Vec<usize>, Error> {
    if n_chunks == 0 {
        bail!("number of chunks must be at least 1");
    }
    Ok((0..=n_chunks).map(|i| cut_point(i, total_genes, n_chunks)).collect())
}

impl ChunkRange {
    pub fn new(total_genes: usize, n_chunks: usize, chunk_id: usize) -> Result<ChunkRange, Error> {
        if n_chunks == 0 {
            bail!("number of chunks must be at least 1");
        }
        if chunk_id >= n_chunks {
            bail!("chunk index {} is out of range for {} chunks", chunk_id, n_chunks);
        }
        Ok(ChunkRange {
            start: cut_point(chunk_id, total_genes, n_chunks),
            end: cut_point(chunk_id + 1, total_genes, n_chunks),
        })
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_genes_three_chunks() {
        let chunks: Vec<_> = (0..3).map(|c| ChunkRange::new(10, 3, c).unwrap()).collect();
        assert_eq!(
            chunks,
            vec![
                ChunkRange { start: 0, end: 4 },
                ChunkRange { start: 4, end: 7 },
                ChunkRange { start: 7, end: 10 },
            ]
        );
        assert_eq!(chunks.iter().map(ChunkRange::len).collect::<Vec<_>>(), vec![4, 3, 3]);
        assert_eq!(chunk_bounds(10, 3).unwrap(), vec![0, 4, 7, 10]);
    }

    #[test]
    fn test_chunks_partition_genes() {
        for total in 0..60 {
            for n_chunks in 1..25 {
                let bounds = chunk_bounds(total, n_chunks).unwrap();
                assert_eq!(bounds.len(), n_chunks + 1);
                assert_eq!(bounds[0], 0);
                assert_eq!(bounds[n_chunks], total);
                assert!(bounds.windows(2).all(|w| w[0] <= w[1]));

                let sizes: Vec<usize> = (0..n_chunks)
                    .map(|c| ChunkRange::new(total, n_chunks, c).unwrap())
                    .scan(0, |expected_start, chunk| {
                        assert_eq!(chunk.start, *expected_start);
                        *expected_start = chunk.end;
                        Some(chunk.len())
                    })
                    .collect();
                assert_eq!(sizes.iter().sum::<usize>(), total);
                let min = *sizes.iter().min().unwrap();
                let max = *sizes.iter().max().unwrap();
                assert!(max - min <= 1, "total={total} n_chunks={n_chunks} sizes={sizes:?}");
            }
        }
    }

    #[test]
    fn test_more_chunks_than_genes() {
        let chunks: Vec<_> = (0..5).map(|c| ChunkRange::new(2, 5, c).unwrap()).collect();
        assert_eq!(chunks.iter().filter(|c| c.is_empty()).count(), 3);
        assert_eq!(chunks.iter().map(ChunkRange::len).sum::<usize>(), 2);
        assert_eq!(ChunkRange::new(0, 1, 0).unwrap().range(), 0..0);
    }

    #[test]
    fn test_large_gene_counts() {
        let total = usize::MAX / 2;
        let last = ChunkRange::new(total, 7, 6).unwrap();
        assert_eq!(last.end, total);
    }

    #[test]
    fn test_invalid_chunks() {
        assert!(ChunkRange::new(10, 0, 0).is_err());
        assert!(ChunkRange::new(10, 3, 3).is_err());
        assert!(chunk_bounds(10, 0).is_err());
    }
}
