//! Coupled-interface contributions to a scalar LDU matrix product.
//!
//! An interface couples the cells next to a patch with values living
//! elsewhere: another patch of the same matrix (cyclic), a patch of another
//! region's matrix (region-coupled), or another rank (processor). The matrix
//! product subtracts `coeffs[f] * neighbour[f]` from the row of each
//! interface face cell.

use crate::error::{HelyxCoreError, Result};
use crate::parallel::comm::Communicator;
use crate::parallel::util::{decode, encode};
use std::fmt::Debug;
use std::rc::Rc;

pub trait LduInterfaceField: Debug {
    /// Rows adjacent to the interface faces.
    fn face_cells(&self) -> &[usize];

    /// Value seen across every interface face, read from `psi`.
    fn neighbour_values(&self, psi: &[f64]) -> Result<Vec<f64>>;

    /// `result[face_cells[f]] -= coeffs[f] * neighbour[f]`
    fn update_interface_matrix(&self, psi: &[f64], result: &mut [f64], coeffs: &[f64]) -> Result<()> {
        let pnf = self.neighbour_values(psi)?;
        for ((&cell, &coeff), value) in self.face_cells().iter().zip(coeffs).zip(pnf) {
            result[cell] -= coeff * value;
        }
        Ok(())
    }
}

/// Per-patch interface list; `None` marks an uncoupled patch.
pub type LduInterfaceFieldPtrs<'a> = [Option<Box<dyn LduInterfaceField + 'a>>];

/// Reads neighbour values from another patch's cells of the same vector.
#[derive(Debug, Clone)]
pub struct CyclicLduInterfaceField {
    face_cells: Vec<usize>,
    neighbour_cells: Vec<usize>,
}

impl CyclicLduInterfaceField {
    pub fn new(face_cells: Vec<usize>, neighbour_cells: Vec<usize>) -> Result<Self> {
        if face_cells.len() != neighbour_cells.len() {
            return Err(HelyxCoreError::InvalidAddressing(format!(
                "cyclic interface has {} faces but neighbour has {}",
                face_cells.len(),
                neighbour_cells.len()
            )));
        }
        Ok(Self {
            face_cells,
            neighbour_cells,
        })
    }
}

impl LduInterfaceField for CyclicLduInterfaceField {
    fn face_cells(&self) -> &[usize] {
        &self.face_cells
    }

    fn neighbour_values(&self, psi: &[f64]) -> Result<Vec<f64>> {
        Ok(self.neighbour_cells.iter().map(|&c| psi[c]).collect())
    }
}

/// Couples a patch to a patch of another region. `neighbour_cells` are in
/// the numbering of the neighbour region's matrix, so this interface only
/// makes sense wrapped in an [`OffsetLduInterfaceField`] inside a combined
/// system.
#[derive(Debug, Clone)]
pub struct RegionCoupledLduInterfaceField {
    face_cells: Vec<usize>,
    neighbour_cells: Vec<usize>,
}

impl RegionCoupledLduInterfaceField {
    pub fn new(face_cells: Vec<usize>, neighbour_cells: Vec<usize>) -> Result<Self> {
        if face_cells.len() != neighbour_cells.len() {
            return Err(HelyxCoreError::InvalidAddressing(format!(
                "region-coupled interface has {} faces but neighbour has {}",
                face_cells.len(),
                neighbour_cells.len()
            )));
        }
        Ok(Self {
            face_cells,
            neighbour_cells,
        })
    }
}

impl LduInterfaceField for RegionCoupledLduInterfaceField {
    fn face_cells(&self) -> &[usize] {
        &self.face_cells
    }

    fn neighbour_values(&self, psi: &[f64]) -> Result<Vec<f64>> {
        Ok(self.neighbour_cells.iter().map(|&c| psi[c]).collect())
    }
}

/// Places an interface of one sub-matrix inside a concatenated system.
///
/// The own rows of the wrapped interface start at `offset` and span `size`
/// rows; its neighbour values are read from the `foreign_size` rows starting
/// at `foreign_offset`.
#[derive(Debug)]
pub struct OffsetLduInterfaceField<'a> {
    inner: Box<dyn LduInterfaceField + 'a>,
    face_cells: Vec<usize>,
    offset: usize,
    size: usize,
    foreign_offset: usize,
    foreign_size: usize,
}

impl<'a> OffsetLduInterfaceField<'a> {
    pub fn new(
        inner: Box<dyn LduInterfaceField + 'a>,
        offset: usize,
        size: usize,
        foreign_offset: usize,
        foreign_size: usize,
    ) -> Self {
        debug_assert!(
            inner.face_cells().iter().all(|&c| c < size),
            "interface face cell outside its sub-matrix of {} rows",
            size
        );
        let face_cells = inner.face_cells().iter().map(|&c| c + offset).collect();
        Self {
            inner,
            face_cells,
            offset,
            size,
            foreign_offset,
            foreign_size,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn foreign_offset(&self) -> usize {
        self.foreign_offset
    }

    pub fn foreign_size(&self) -> usize {
        self.foreign_size
    }
}

impl LduInterfaceField for OffsetLduInterfaceField<'_> {
    fn face_cells(&self) -> &[usize] {
        &self.face_cells
    }

    fn neighbour_values(&self, psi: &[f64]) -> Result<Vec<f64>> {
        debug_assert!(self.foreign_offset + self.foreign_size <= psi.len());
        let foreign = &psi[self.foreign_offset..self.foreign_offset + self.foreign_size];
        self.inner.neighbour_values(foreign)
    }
}

/// Exchanges face-cell values with the rank on the other side of a
/// processor boundary. Both ranks must evaluate their matching interfaces in
/// the same order.
#[derive(Debug)]
pub struct ProcessorLduInterfaceField<C: Communicator> {
    face_cells: Vec<usize>,
    neighbour_rank: usize,
    comm: Rc<C>,
}

impl<C: Communicator> ProcessorLduInterfaceField<C> {
    pub fn new(face_cells: Vec<usize>, neighbour_rank: usize, comm: Rc<C>) -> Self {
        Self {
            face_cells,
            neighbour_rank,
            comm,
        }
    }

    pub fn neighbour_rank(&self) -> usize {
        self.neighbour_rank
    }
}

impl<C: Communicator + Debug> LduInterfaceField for ProcessorLduInterfaceField<C> {
    fn face_cells(&self) -> &[usize] {
        &self.face_cells
    }

    fn neighbour_values(&self, psi: &[f64]) -> Result<Vec<f64>> {
        let own: Vec<f64> = self.face_cells.iter().map(|&c| psi[c]).collect();
        self.comm.send(self.neighbour_rank, encode(&own)?);
        let received: Vec<f64> = decode(&self.comm.recv_from(self.neighbour_rank))?;
        if received.len() != own.len() {
            return Err(HelyxCoreError::Communication(format!(
                "processor interface to rank {} sent {} values, expected {}",
                self.neighbour_rank,
                received.len(),
                own.len()
            )));
        }
        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_update_subtracts_neighbour_contribution() {
        let cyclic = CyclicLduInterfaceField::new(vec![0], vec![2]).unwrap();
        let psi = [1.0, 2.0, 3.0];
        let mut result = [0.0; 3];
        cyclic.update_interface_matrix(&psi, &mut result, &[0.5]).unwrap();
        assert_eq!(result, [-1.5, 0.0, 0.0]);
    }

    #[test]
    fn test_offset_interface_addresses_foreign_block() {
        // rows 0..2 belong to matrix A, rows 2..5 to matrix B
        let inner = RegionCoupledLduInterfaceField::new(vec![1], vec![0]).unwrap();
        let wrapped = OffsetLduInterfaceField::new(Box::new(inner), 0, 2, 2, 3);
        assert_eq!(wrapped.face_cells(), &[1]);

        let psi = [10.0, 20.0, 7.0, 8.0, 9.0];
        let mut result = [0.0; 5];
        wrapped.update_interface_matrix(&psi, &mut result, &[2.0]).unwrap();
        assert_eq!(result, [0.0, -14.0, 0.0, 0.0, 0.0]);

        let inner = RegionCoupledLduInterfaceField::new(vec![2], vec![1]).unwrap();
        let reverse = OffsetLduInterfaceField::new(Box::new(inner), 2, 3, 0, 2);
        assert_eq!(reverse.face_cells(), &[4]);
        assert_eq!(reverse.neighbour_values(&psi).unwrap(), vec![20.0]);
    }

    #[test]
    fn test_mismatched_cyclic_sizes_rejected() {
        assert!(CyclicLduInterfaceField::new(vec![0, 1], vec![2]).is_err());
    }
}
