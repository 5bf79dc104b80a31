use crate::error::{Error, Result};
use crate::interchange::sample_precision::SamplePrecision;

/// Number of blocks (or MCUs) needed to cover `pixels` with units of `unit` pixels.
pub fn mcu_per_dim(pixels: usize, unit: usize) -> usize {
    pixels.div_ceil(unit)
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ComponentType {
    Grayscale,
    Color,
}

impl ComponentType {
    pub(crate) fn from(count: u8) -> Result<Self> {
        match count {
            1 => Ok(ComponentType::Grayscale),
            3 => Ok(ComponentType::Color),
            _ => Err(Error::segment(
                "SOF0",
                format!("{count} components, expected 1 or 3"),
            )),
        }
    }

    pub fn component_count(&self) -> usize {
        match self {
            ComponentType::Grayscale => 1,
            ComponentType::Color => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Zero-based; the wire carries it one-based.
    pub(crate) component_id: u8,
    pub(crate) horizontal_sampling: u8,
    pub(crate) vertical_sampling: u8,
    pub(crate) qt_table_id: u8,
    pub(crate) dc_table_id: u8,
    pub(crate) ac_table_id: u8,
}

impl Component {
    pub(crate) fn from(component_id: u8, horizontal: u8, vertical: u8, qt_table_id: u8) -> Self {
        Component {
            component_id,
            horizontal_sampling: horizontal,
            vertical_sampling: vertical,
            qt_table_id,
            dc_table_id: 0,
            ac_table_id: 0,
        }
    }

    pub fn sampling(&self) -> (u8, u8) {
        (self.horizontal_sampling, self.vertical_sampling)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameInfo {
    pub precision: SamplePrecision,
    pub height: u16,
    pub width: u16,
    pub component_type: ComponentType,
    pub(crate) components: Vec<Component>,
}

impl FrameInfo {
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn geometry(&self) -> McuGeometry {
        McuGeometry::new(self.width as usize, self.height as usize, &self.components)
    }
}

/// Block and MCU layout derived from the frame dimensions and sampling factors.
#[derive(Debug, Clone, PartialEq)]
pub struct McuGeometry {
    /// Per component, in frame order: blocks per MCU horizontally and vertically.
    pub blocks: Vec<(usize, usize)>,
    /// MCU size in blocks.
    pub max_h: usize,
    pub max_v: usize,
    /// MCU size in pixels.
    pub mcu_width: usize,
    pub mcu_height: usize,
    /// MCU grid.
    pub mcus_x: usize,
    pub mcus_y: usize,
}

impl McuGeometry {
    /// A single-component frame is non-interleaved: its MCU is one block whatever sampling
    /// factors the header declares.
    pub fn new(width: usize, height: usize, components: &[Component]) -> Self {
        let blocks: Vec<(usize, usize)> = if components.len() == 1 {
            vec![(1, 1)]
        } else {
            components
                .iter()
                .map(|c| (c.horizontal_sampling as usize, c.vertical_sampling as usize))
                .collect()
        };

        let max_h = blocks.iter().map(|&(h, _)| h).max().unwrap_or(1);
        let max_v = blocks.iter().map(|&(_, v)| v).max().unwrap_or(1);
        let (mcu_width, mcu_height) = (max_h * 8, max_v * 8);

        McuGeometry {
            mcus_x: mcu_per_dim(width, mcu_width),
            mcus_y: mcu_per_dim(height, mcu_height),
            blocks,
            max_h,
            max_v,
            mcu_width,
            mcu_height,
        }
    }

    pub fn mcu_count(&self) -> usize {
        self.mcus_x * self.mcus_y
    }

    pub fn blocks_per_mcu(&self) -> usize {
        self.blocks.iter().map(|&(h, v)| h * v).sum()
    }

    /// How many MCU pixels one sample of component `idx` covers, per axis.
    pub fn scale(&self, idx: usize) -> (usize, usize) {
        let (h, v) = self.blocks[idx];
        (self.max_h / h, self.max_v / v)
    }
}
