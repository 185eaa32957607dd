use crate::error::{HelyxCoreError, Result};
use std::sync::OnceLock;

/// Lower/upper face addressing of an LDU matrix.
///
/// Face `f` connects the owner cell `lower_addr[f]` and the neighbour cell
/// `upper_addr[f]`, with `lower_addr[f] < upper_addr[f]`. Faces are ordered
/// by owner. `patch_addr[p]` lists the cells next to the faces of boundary
/// patch `p`.
#[derive(Debug, Clone)]
pub struct LduAddressing {
    n_cells: usize,
    lower_addr: Vec<usize>,
    upper_addr: Vec<usize>,
    patch_addr: Vec<Vec<usize>>,
    losort: OnceLock<Vec<usize>>,
    owner_start: OnceLock<Vec<usize>>,
}

impl PartialEq for LduAddressing {
    fn eq(&self, other: &Self) -> bool {
        self.n_cells == other.n_cells
            && self.lower_addr == other.lower_addr
            && self.upper_addr == other.upper_addr
            && self.patch_addr == other.patch_addr
    }
}

impl LduAddressing {
    pub fn new(
        n_cells: usize,
        lower_addr: Vec<usize>,
        upper_addr: Vec<usize>,
        patch_addr: Vec<Vec<usize>>,
    ) -> Result<Self> {
        if lower_addr.len() != upper_addr.len() {
            return Err(HelyxCoreError::InvalidAddressing(format!(
                "lower ({}) and upper ({}) addressing differ in size",
                lower_addr.len(),
                upper_addr.len()
            )));
        }
        for (face, (&l, &u)) in lower_addr.iter().zip(&upper_addr).enumerate() {
            if l >= n_cells || u >= n_cells {
                return Err(HelyxCoreError::InvalidAddressing(format!(
                    "face {} addresses cell outside 0..{}",
                    face, n_cells
                )));
            }
            if l >= u {
                return Err(HelyxCoreError::InvalidAddressing(format!(
                    "face {} owner {} is not below neighbour {}",
                    face, l, u
                )));
            }
        }
        if lower_addr.windows(2).any(|w| w[0] > w[1]) {
            return Err(HelyxCoreError::InvalidAddressing(
                "faces are not ordered by owner".to_string(),
            ));
        }
        for (patch, cells) in patch_addr.iter().enumerate() {
            if let Some(&bad) = cells.iter().find(|&&c| c >= n_cells) {
                return Err(HelyxCoreError::InvalidAddressing(format!(
                    "patch {} addresses cell {} outside 0..{}",
                    patch, bad, n_cells
                )));
            }
        }

        Ok(Self {
            n_cells,
            lower_addr,
            upper_addr,
            patch_addr,
            losort: OnceLock::new(),
            owner_start: OnceLock::new(),
        })
    }

    /// Number of rows.
    pub fn size(&self) -> usize {
        self.n_cells
    }

    pub fn n_faces(&self) -> usize {
        self.lower_addr.len()
    }

    pub fn n_patches(&self) -> usize {
        self.patch_addr.len()
    }

    pub fn lower_addr(&self) -> &[usize] {
        &self.lower_addr
    }

    pub fn upper_addr(&self) -> &[usize] {
        &self.upper_addr
    }

    pub fn patch_addr(&self, patch: usize) -> &[usize] {
        &self.patch_addr[patch]
    }

    pub fn patch_addrs(&self) -> &[Vec<usize>] {
        &self.patch_addr
    }

    /// Faces sorted by neighbour cell.
    pub fn losort(&self) -> &[usize] {
        self.losort.get_or_init(|| {
            let mut faces: Vec<usize> = (0..self.n_faces()).collect();
            faces.sort_by_key(|&f| (self.upper_addr[f], f));
            faces
        })
    }

    /// `owner_start[c]..owner_start[c + 1]` are the faces owned by `c`.
    pub fn owner_start(&self) -> &[usize] {
        self.owner_start.get_or_init(|| {
            let mut start = vec![0usize; self.n_cells + 1];
            for &l in &self.lower_addr {
                start[l + 1] += 1;
            }
            for c in 1..=self.n_cells {
                start[c] += start[c - 1];
            }
            start
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: usize) -> LduAddressing {
        let lower = (0..n - 1).collect();
        let upper = (1..n).collect();
        LduAddressing::new(n, lower, upper, vec![vec![0], vec![n - 1]]).unwrap()
    }

    #[test]
    fn test_owner_start_and_losort() {
        let addr = chain(4);
        assert_eq!(addr.owner_start(), &[0, 1, 2, 3, 3]);
        assert_eq!(addr.losort(), &[0, 1, 2]);
        assert_eq!(addr.patch_addr(1), &[3]);
    }

    #[test]
    fn test_rejects_unordered_faces() {
        let result = LduAddressing::new(3, vec![1, 0], vec![2, 1], vec![]);
        assert!(matches!(result, Err(HelyxCoreError::InvalidAddressing(_))));
    }

    #[test]
    fn test_rejects_out_of_range_patch_cell() {
        let result = LduAddressing::new(2, vec![0], vec![1], vec![vec![2]]);
        assert!(matches!(result, Err(HelyxCoreError::InvalidAddressing(_))));
    }
}
