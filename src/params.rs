//! Row-oriented parameter layout shared with persistence front ends.
//!
//! | row | content |
//! |-----|---------|
//! | 1   | anchor x-coordinates |
//! | 2   | anchor y-coordinates |
//! | 3   | receiver `x, y` |
//! | 4   | `tau` |
//! | 5   | per-anchor residual terms (may be empty) |
//!
//! Column `i` of rows 1, 2 and 5 belongs to anchor `i`. Encoding the rows as
//! text is left to the caller.
use nalgebra::Point2;

use crate::{Beacons, ConstructionError};

const ROWS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSheet {
    pub anchor_x: Vec<f64>,
    pub anchor_y: Vec<f64>,
    pub receiver: Point2<f64>,
    pub tau: f64,
    pub residuals: Vec<f64>,
}

impl ParameterSheet {
    /// Read the five rows back.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, ConstructionError> {
        if rows.len() != ROWS {
            return Err(ConstructionError::SheetRows(rows.len()));
        }
        let row: Vec<&[f64]> = rows.iter().map(AsRef::as_ref).collect();
        let anchors = row[0].len();
        expect_len(2, row[1], anchors)?;
        expect_len(3, row[2], 2)?;
        expect_len(4, row[3], 1)?;
        if !row[4].is_empty() {
            expect_len(5, row[4], anchors)?;
        }
        Ok(Self {
            anchor_x: row[0].to_vec(),
            anchor_y: row[1].to_vec(),
            receiver: Point2::new(row[2][0], row[2][1]),
            tau: row[3][0],
            residuals: row[4].to_vec(),
        })
    }

    /// The five rows, in the same column order they were read.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        vec![
            self.anchor_x.clone(),
            self.anchor_y.clone(),
            vec![self.receiver.x, self.receiver.y],
            vec![self.tau],
            self.residuals.clone(),
        ]
    }

    pub fn anchors(&self) -> Vec<Point2<f64>> {
        self.anchor_x
            .iter()
            .zip(&self.anchor_y)
            .map(|(&x, &y)| Point2::new(x, y))
            .collect()
    }

    /// Beacons with observations synthesized from this sheet.
    pub fn to_beacons(&self) -> Result<Beacons, ConstructionError> {
        Beacons::simulate(self.anchors(), self.receiver, self.tau, &self.residuals)
    }
}

fn expect_len(row: usize, values: &[f64], expected: usize) -> Result<(), ConstructionError> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(ConstructionError::SheetRowLength {
            row,
            expected,
            found: values.len(),
        })
    }
}
