use serde::Deserialize;

use manet_core::error::ConfigError;

use crate::mobility::Point2D;

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GridLayout {
    #[default]
    RowFirst,
    ColumnFirst,
}

/// Grid position allocator. Nodes fill a row (or a column) of `grid_width` cells before the
/// next row (or column) is started.
#[derive(Debug, Clone, Copy)]
pub struct GridAllocator {
    pub min_x: f64,
    pub min_y: f64,
    pub delta_x: f64,
    pub delta_y: f64,
    pub grid_width: u32,
    pub layout: GridLayout,
}

impl GridAllocator {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_width == 0 {
            return Err(ConfigError::invalid("grid_width", "> 0", self.grid_width));
        }
        for (field, value) in [
            ("min_x", self.min_x),
            ("min_y", self.min_y),
            ("delta_x", self.delta_x),
            ("delta_y", self.delta_y),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::invalid(field, "finite", value));
            }
        }
        Ok(())
    }

    pub fn position_of(&self, index: u32) -> Point2D {
        let (column, row) = (index % self.grid_width, index / self.grid_width);
        match self.layout {
            GridLayout::RowFirst => Point2D {
                x: self.min_x + self.delta_x * column as f64,
                y: self.min_y + self.delta_y * row as f64,
            },
            GridLayout::ColumnFirst => Point2D {
                x: self.min_x + self.delta_x * row as f64,
                y: self.min_y + self.delta_y * column as f64,
            },
        }
    }

    pub fn positions(&self, node_count: u32) -> Vec<Point2D> {
        (0..node_count).map(|index| self.position_of(index)).collect()
    }
}
