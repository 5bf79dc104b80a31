use std::io::{Seek, Write};

use log::{debug, warn};

use crate::bitstream::{BitReader, BitWriter};
use crate::entropy::block::BLOCK_SIZE;
use crate::entropy::huffman_table::{HuffmanClass, HuffmanTree};
use crate::error::{Error, Result};
use crate::interchange::component::{Component, ComponentType, FrameInfo};
use crate::interchange::marker::Marker;
use crate::interchange::sample_precision::SamplePrecision;
use crate::quantize::quantization_table::QuantizationTable;

pub(crate) const JFIF_IDENTIFIER: &[u8; 5] = b"JFIF\0";

const HUFFMAN_SLOTS: usize = 4;
const QUANT_SLOTS: usize = 16;

/// Header sections that must all have been seen before a scan may be decoded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Sections(u8);

impl Sections {
    pub const DQT: Sections = Sections(1);
    pub const SOF0: Sections = Sections(1 << 1);
    pub const DHT: Sections = Sections(1 << 2);
    pub const ALL: Sections = Sections(0b111);

    pub fn insert(&mut self, other: Sections) {
        self.0 |= other.0;
    }

    pub fn contains(&self, other: Sections) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn missing(&self) -> Vec<&'static str> {
        [
            (Sections::DQT, "DQT"),
            (Sections::SOF0, "SOF0"),
            (Sections::DHT, "DHT"),
        ]
        .into_iter()
        .filter(|(section, _)| !self.contains(*section))
        .map(|(_, name)| name)
        .collect()
    }
}

/// Fields of the APP0 JFIF header following the identifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JfifHeader {
    pub version: (u8, u8),
    pub units: u8,
    pub x_density: u16,
    pub y_density: u16,
}

/// Everything the header segments of one image define.
#[derive(Debug, Default)]
pub struct JFIF {
    pub(crate) header: Option<JfifHeader>,
    pub(crate) quant_tables: [Option<QuantizationTable>; QUANT_SLOTS],
    pub(crate) dc_tables: [Option<HuffmanTree>; HUFFMAN_SLOTS],
    pub(crate) ac_tables: [Option<HuffmanTree>; HUFFMAN_SLOTS],
    pub(crate) frame: Option<FrameInfo>,
    /// Frame component indices in the order the scan interleaves them.
    pub(crate) scan_order: Vec<usize>,
    pub(crate) sections: Sections,
}

impl JFIF {
    pub(crate) fn parse_app0(&mut self, body: &mut BitReader) -> Result<()> {
        let identifier = body.read_slice(JFIF_IDENTIFIER.len())?;
        if identifier != JFIF_IDENTIFIER {
            return Err(Error::segment(
                "APP0",
                format!("identifier {identifier:02X?} is not JFIF"),
            ));
        }

        let header = JfifHeader {
            version: (body.read_u8()?, body.read_u8()?),
            units: body.read_u8()?,
            x_density: body.read_u16_be()?,
            y_density: body.read_u16_be()?,
        };

        let (thumb_w, thumb_h) = (body.read_u8()? as usize, body.read_u8()? as usize);
        body.skip(3 * thumb_w * thumb_h)?;

        debug!(
            "JFIF {}.{:02}, density {}x{} (units {}), thumbnail {thumb_w}x{thumb_h}",
            header.version.0, header.version.1, header.x_density, header.y_density, header.units
        );
        self.header = Some(header);

        Ok(())
    }

    pub(crate) fn parse_dqt(&mut self, body: &mut BitReader) -> Result<()> {
        while !body.at_end() {
            let pq_tq = body.read_u8()?;
            let precision = SamplePrecision::decode(pq_tq >> 4)?;
            if precision != SamplePrecision::EightBit {
                return Err(Error::segment("DQT", "only 8-bit tables are supported"));
            }
            let table_id = pq_tq & 0x0F;

            let mut elements = [0u8; BLOCK_SIZE];
            elements.copy_from_slice(body.read_slice(BLOCK_SIZE)?);

            debug!("quantization table {table_id}");
            self.quant_tables[table_id as usize] = Some(QuantizationTable::from(table_id, elements));
        }

        self.sections.insert(Sections::DQT);
        Ok(())
    }

    /// Component ids must be exactly `1..=component count`; they are stored zero-based.
    pub(crate) fn parse_sof0(&mut self, body: &mut BitReader) -> Result<()> {
        if self.frame.is_some() {
            return Err(Error::segment("SOF0", "more than one frame header"));
        }

        let precision = SamplePrecision::parse(body.read_u8()?)?;
        if precision != SamplePrecision::EightBit {
            return Err(Error::segment("SOF0", "baseline frames carry 8-bit samples"));
        }

        let height = body.read_u16_be()?;
        let width = body.read_u16_be()?;
        if height == 0 || width == 0 {
            return Err(Error::segment(
                "SOF0",
                format!("image dimensions {width}x{height}"),
            ));
        }

        let count = body.read_u8()?;
        let component_type = ComponentType::from(count)?;

        let mut components: Vec<Component> = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let id = body.read_u8()?;
            if id == 0 || id > count {
                return Err(Error::segment(
                    "SOF0",
                    format!("component id {id} outside 1..={count}"),
                ));
            }
            let id = id - 1;
            if components.iter().any(|c| c.component_id == id) {
                return Err(Error::segment("SOF0", format!("duplicate component {}", id + 1)));
            }

            let sampling = body.read_u8()?;
            let (horizontal, vertical) = (sampling >> 4, sampling & 0x0F);
            if !(1..=2).contains(&horizontal) || !(1..=2).contains(&vertical) {
                return Err(Error::segment(
                    "SOF0",
                    format!("sampling factors {horizontal}x{vertical}"),
                ));
            }

            let qt_table_id = body.read_u8()?;
            if qt_table_id as usize >= QUANT_SLOTS {
                return Err(Error::segment(
                    "SOF0",
                    format!("quantization table {qt_table_id}"),
                ));
            }

            components.push(Component::from(id, horizontal, vertical, qt_table_id));
        }
        components.sort_by_key(|c| c.component_id);

        let frame = FrameInfo {
            precision,
            height,
            width,
            component_type,
            components,
        };
        debug!(
            "frame {}x{}, {:?}, sampling {:?}",
            width,
            height,
            component_type,
            frame.components.iter().map(Component::sampling).collect::<Vec<_>>()
        );

        self.frame = Some(frame);
        self.sections.insert(Sections::SOF0);
        Ok(())
    }

    pub(crate) fn parse_dht(&mut self, body: &mut BitReader) -> Result<()> {
        while !body.at_end() {
            let tc_th = body.read_u8()?;
            let class = HuffmanClass::from(tc_th >> 4)?;
            let destination_id = tc_th & 0x0F;
            if destination_id as usize >= HUFFMAN_SLOTS {
                return Err(Error::segment(
                    "DHT",
                    format!("table destination {destination_id}"),
                ));
            }

            let (tree, consumed) = HuffmanTree::load_table(body, class, destination_id)?;
            debug!("{class:?} Huffman table {destination_id}, {consumed} bytes");

            let slots = match class {
                HuffmanClass::DC => &mut self.dc_tables,
                HuffmanClass::AC => &mut self.ac_tables,
            };
            slots[destination_id as usize] = Some(tree);
        }

        self.sections.insert(Sections::DHT);
        Ok(())
    }

    pub(crate) fn parse_sos(&mut self, body: &mut BitReader) -> Result<()> {
        let frame = self
            .frame
            .as_mut()
            .ok_or_else(|| Error::MissingSections("SOF0".to_string()))?;

        let count = body.read_u8()? as usize;
        if count != frame.components.len() {
            return Err(Error::segment(
                "SOS",
                format!(
                    "scan has {count} components, frame has {}",
                    frame.components.len()
                ),
            ));
        }

        let mut scan_order = Vec::with_capacity(count);
        for _ in 0..count {
            let id = body.read_u8()?;
            let idx = frame
                .components
                .iter()
                .position(|c| c.component_id as u16 + 1 == id as u16)
                .ok_or_else(|| Error::segment("SOS", format!("unknown component {id}")))?;
            if scan_order.contains(&idx) {
                return Err(Error::segment("SOS", format!("component {id} listed twice")));
            }

            let td_ta = body.read_u8()?;
            let (dc_table_id, ac_table_id) = (td_ta >> 4, td_ta & 0x0F);
            if dc_table_id as usize >= HUFFMAN_SLOTS || ac_table_id as usize >= HUFFMAN_SLOTS {
                return Err(Error::segment(
                    "SOS",
                    format!("Huffman tables {dc_table_id}/{ac_table_id}"),
                ));
            }

            let component = &mut frame.components[idx];
            component.dc_table_id = dc_table_id;
            component.ac_table_id = ac_table_id;
            scan_order.push(idx);
        }

        let (ss, se, ah_al) = (body.read_u8()?, body.read_u8()?, body.read_u8()?);
        if (ss, se, ah_al) != (0x00, 0x3F, 0x00) {
            warn!("ignoring spectral selection {ss}..={se}, approximation {ah_al:#04x}");
        }

        self.scan_order = scan_order;
        Ok(())
    }

    /// Restart intervals are not supported; a DRI that disables them is accepted.
    pub(crate) fn parse_dri(body: &mut BitReader) -> Result<()> {
        match body.read_u16_be()? {
            0 => Ok(()),
            interval => Err(Error::Unsupported(format!(
                "restart interval of {interval} MCUs"
            ))),
        }
    }

    pub(crate) fn frame(&self) -> Result<&FrameInfo> {
        self.frame
            .as_ref()
            .ok_or_else(|| Error::MissingSections("SOF0".to_string()))
    }

    pub(crate) fn quant_table(&self, id: u8) -> Result<&QuantizationTable> {
        self.quant_tables
            .get(id as usize)
            .and_then(Option::as_ref)
            .ok_or(Error::MissingQuantTable(id))
    }

    pub(crate) fn huffman_table(&self, class: HuffmanClass, id: u8) -> Result<&HuffmanTree> {
        let slots = match class {
            HuffmanClass::DC => &self.dc_tables,
            HuffmanClass::AC => &self.ac_tables,
        };
        slots
            .get(id as usize)
            .and_then(Option::as_ref)
            .ok_or(Error::MissingHuffmanTable(class, id))
    }
}

pub(crate) fn write_marker<W: Write + Seek>(writer: &mut BitWriter<W>, marker: Marker) -> Result<()> {
    writer.write_byte(Marker::PREFIX)?;
    writer.write_byte(marker as u8)
}

/// Writes `marker`, a placeholder length, the body, then patches the length.
pub(crate) fn write_segment<W, F>(writer: &mut BitWriter<W>, marker: Marker, body: F) -> Result<()>
where
    W: Write + Seek,
    F: FnOnce(&mut BitWriter<W>) -> Result<()>,
{
    write_marker(writer, marker)?;

    let length_at = writer.tell()?;
    writer.write_u16_be(0)?;
    body(writer)?;
    let end = writer.tell()?;

    let length = u16::try_from(end - length_at).map_err(|_| {
        Error::InvalidParameter(format!("{} segment exceeds 65535 bytes", marker.name()))
    })?;
    writer.seek(length_at)?;
    writer.write_u16_be(length)?;
    writer.seek(end)?;

    debug!("wrote {} segment, {length} bytes", marker.name());
    Ok(())
}

/// JFIF 1.01, 1:1 aspect ratio, no thumbnail.
pub(crate) fn write_app0<W: Write + Seek>(writer: &mut BitWriter<W>) -> Result<()> {
    write_segment(writer, Marker::APP0, |w| {
        w.write_all(JFIF_IDENTIFIER)?;
        w.write_all(&[1, 1, 0])?;
        w.write_u16_be(1)?;
        w.write_u16_be(1)?;
        w.write_all(&[0, 0])
    })
}

pub(crate) fn write_com<W: Write + Seek>(writer: &mut BitWriter<W>, comment: &[u8]) -> Result<()> {
    write_segment(writer, Marker::COM, |w| w.write_all(comment))
}

pub(crate) fn write_dqt<W: Write + Seek>(
    writer: &mut BitWriter<W>,
    tables: &[&QuantizationTable],
) -> Result<()> {
    write_segment(writer, Marker::DQT, |w| {
        for table in tables {
            let pq = match table.precision {
                SamplePrecision::EightBit => 0,
                SamplePrecision::SixteenBit => 1,
            };
            w.write_byte(pq << 4 | table.table_destination_id & 0x0F)?;
            w.write_all(&table.elements)?;
        }
        Ok(())
    })
}

pub(crate) fn write_sof0<W: Write + Seek>(writer: &mut BitWriter<W>, frame: &FrameInfo) -> Result<()> {
    write_segment(writer, Marker::SOF0, |w| {
        w.write_byte(frame.precision.bits())?;
        w.write_u16_be(frame.height)?;
        w.write_u16_be(frame.width)?;
        w.write_byte(frame.components.len() as u8)?;
        for c in &frame.components {
            w.write_byte(c.component_id + 1)?;
            w.write_byte(c.horizontal_sampling << 4 | c.vertical_sampling)?;
            w.write_byte(c.qt_table_id)?;
        }
        Ok(())
    })
}

pub(crate) fn write_dht<W: Write + Seek>(writer: &mut BitWriter<W>, tables: &[&HuffmanTree]) -> Result<()> {
    write_segment(writer, Marker::DHT, |w| {
        for table in tables {
            w.write_byte((table.class() as u8) << 4 | table.destination_id())?;
            w.write_all(&table.export_canonical())?;
        }
        Ok(())
    })
}

pub(crate) fn write_sos<W: Write + Seek>(
    writer: &mut BitWriter<W>,
    frame: &FrameInfo,
    scan_order: &[usize],
) -> Result<()> {
    write_segment(writer, Marker::SOS, |w| {
        w.write_byte(scan_order.len() as u8)?;
        for &idx in scan_order {
            let c = &frame.components[idx];
            w.write_byte(c.component_id + 1)?;
            w.write_byte(c.dc_table_id << 4 | c.ac_table_id)?;
        }
        // spectral selection 0..=63, no successive approximation
        w.write_all(&[0x00, 0x3F, 0x00])
    })
}
