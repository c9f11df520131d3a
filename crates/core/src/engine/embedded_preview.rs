//! Embedded preview extraction for camera RAW files.
//!
//! Most RAW containers carry one or more JPEG renditions next to the sensor
//! data. TIFF-based formats (CR2, NEF, ARW, DNG, ORF, PEF, RW2, SRW, NRW)
//! reference them from IFD0, its SubIFDs or IFD1. Fujifilm RAF stores a
//! pointer in its fixed header. Everything else (CR3, CRW, ...) falls back to
//! a marker scan. The largest candidate wins.

use bytes::Bytes;
use std::collections::HashSet;

use super::error::EngineError;
use super::traits::PreviewEngine;

const TIFF_LE: [u8; 4] = [0x49, 0x49, 0x2A, 0x00];
const TIFF_BE: [u8; 4] = [0x4D, 0x4D, 0x00, 0x2A];
/// Panasonic RW2 uses a non-standard TIFF magic.
const RW2_LE: [u8; 4] = [0x49, 0x49, 0x55, 0x00];
/// Olympus ORF variants.
const ORF_LE: [u8; 4] = [0x49, 0x49, 0x52, 0x4F];
const ORF_LE_ALT: [u8; 4] = [0x49, 0x49, 0x52, 0x53];
const RAF_MAGIC: &[u8] = b"FUJIFILMCCD-RAW";
/// Offset of the JPEG pointer in a RAF header.
const RAF_JPEG_POINTER: usize = 84;

const TAG_COMPRESSION: u16 = 0x0103;
const TAG_STRIP_OFFSETS: u16 = 0x0111;
const TAG_STRIP_BYTE_COUNTS: u16 = 0x0117;
const TAG_SUBIFD: u16 = 0x014A;
const TAG_JPEG_OFFSET: u16 = 0x0201;
const TAG_JPEG_LENGTH: u16 = 0x0202;
const TAG_EXIF_IFD: u16 = 0x8769;

const COMPRESSION_JPEG_OLD: u32 = 6;
const COMPRESSION_JPEG: u32 = 7;

const TYPE_SHORT: u16 = 3;

/// Upper bound on IFDs visited, against malformed offset cycles.
const MAX_IFDS: usize = 64;
const MAX_IFD_ENTRIES: u16 = 1000;

/// Ignore marker-scan hits smaller than this (EXIF thumbnails, noise).
const MIN_SCANNED_JPEG: usize = 16 * 1024;

/// Fast extractor returning the largest embedded JPEG preview.
#[derive(Debug, Default)]
pub struct EmbeddedPreviewEngine;

impl EmbeddedPreviewEngine {
    pub fn new() -> Self {
        Self
    }
}

impl PreviewEngine for EmbeddedPreviewEngine {
    fn extract_preview(&mut self, bytes: &[u8]) -> Result<Bytes, EngineError> {
        let (offset, len) = find_largest_preview(bytes).ok_or(EngineError::NoPreview)?;
        Ok(Bytes::copy_from_slice(&bytes[offset..offset + len]))
    }
}

/// Locates the largest embedded JPEG as an `(offset, length)` range.
pub fn find_largest_preview(bytes: &[u8]) -> Option<(usize, usize)> {
    let mut candidates = Vec::new();

    if bytes.starts_with(RAF_MAGIC) {
        candidates.extend(raf_preview(bytes));
    } else if let Some(little_endian) = tiff_byte_order(bytes) {
        TiffWalker::new(bytes, little_endian).collect(&mut candidates);
    }

    if candidates.is_empty() {
        candidates.extend(scan_for_jpegs(bytes));
    }

    candidates.into_iter().max_by_key(|&(_, len)| len)
}

fn tiff_byte_order(bytes: &[u8]) -> Option<bool> {
    let header: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    match header {
        TIFF_LE | RW2_LE | ORF_LE | ORF_LE_ALT => Some(true),
        TIFF_BE => Some(false),
        _ => None,
    }
}

fn is_jpeg_at(bytes: &[u8], offset: usize, len: usize) -> bool {
    len > 2
        && offset
            .checked_add(len)
            .is_some_and(|end| end <= bytes.len())
        && bytes[offset] == 0xFF
        && bytes[offset + 1] == 0xD8
}

fn raf_preview(bytes: &[u8]) -> Option<(usize, usize)> {
    let offset = read_u32(bytes, RAF_JPEG_POINTER, false)? as usize;
    let len = read_u32(bytes, RAF_JPEG_POINTER + 4, false)? as usize;
    is_jpeg_at(bytes, offset, len).then_some((offset, len))
}

fn read_u16(bytes: &[u8], offset: usize, little_endian: bool) -> Option<u16> {
    let raw: [u8; 2] = bytes.get(offset..offset.checked_add(2)?)?.try_into().ok()?;
    Some(if little_endian {
        u16::from_le_bytes(raw)
    } else {
        u16::from_be_bytes(raw)
    })
}

fn read_u32(bytes: &[u8], offset: usize, little_endian: bool) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
    Some(if little_endian {
        u32::from_le_bytes(raw)
    } else {
        u32::from_be_bytes(raw)
    })
}

struct IfdEntry {
    tag: u16,
    typ: u16,
    count: u32,
    /// Value or offset field, unreinterpreted.
    value_pos: usize,
}

struct TiffWalker<'a> {
    bytes: &'a [u8],
    little_endian: bool,
    visited: HashSet<usize>,
    pending: Vec<usize>,
}

impl<'a> TiffWalker<'a> {
    fn new(bytes: &'a [u8], little_endian: bool) -> Self {
        let ifd0 = read_u32(bytes, 4, little_endian).unwrap_or(0) as usize;
        Self {
            bytes,
            little_endian,
            visited: HashSet::new(),
            pending: vec![ifd0],
        }
    }

    fn collect(mut self, candidates: &mut Vec<(usize, usize)>) {
        while let Some(offset) = self.pending.pop() {
            if offset == 0 || self.visited.len() >= MAX_IFDS || !self.visited.insert(offset) {
                continue;
            }
            let Some((entries, next)) = self.parse_ifd(offset) else {
                continue;
            };
            if next != 0 {
                self.pending.push(next);
            }
            candidates.extend(self.jpeg_from_entries(&entries));
            let mut nested = Vec::new();
            for entry in &entries {
                match entry.tag {
                    TAG_SUBIFD => nested.extend(self.offsets(entry)),
                    TAG_EXIF_IFD => nested.extend(self.value(entry).map(|v| v as usize)),
                    _ => {}
                }
            }
            self.pending.extend(nested);
        }
    }

    fn parse_ifd(&self, offset: usize) -> Option<(Vec<IfdEntry>, usize)> {
        let count = read_u16(self.bytes, offset, self.little_endian)?;
        if count == 0 || count > MAX_IFD_ENTRIES {
            return None;
        }
        let entries = (0..count as usize)
            .filter_map(|i| {
                let pos = offset + 2 + i * 12;
                Some(IfdEntry {
                    tag: read_u16(self.bytes, pos, self.little_endian)?,
                    typ: read_u16(self.bytes, pos + 2, self.little_endian)?,
                    count: read_u32(self.bytes, pos + 4, self.little_endian)?,
                    value_pos: pos + 8,
                })
            })
            .collect();
        let next = read_u32(self.bytes, offset + 2 + count as usize * 12, self.little_endian)
            .unwrap_or(0) as usize;
        Some((entries, next))
    }

    /// First value of an entry, honouring SHORT values packed in the field.
    fn value(&self, entry: &IfdEntry) -> Option<u32> {
        if entry.typ == TYPE_SHORT {
            read_u16(self.bytes, entry.value_pos, self.little_endian).map(u32::from)
        } else {
            read_u32(self.bytes, entry.value_pos, self.little_endian)
        }
    }

    /// All LONG offsets an entry points to.
    fn offsets(&self, entry: &IfdEntry) -> Vec<usize> {
        if entry.count <= 1 {
            return self.value(entry).map(|v| vec![v as usize]).unwrap_or_default();
        }
        let Some(base) = read_u32(self.bytes, entry.value_pos, self.little_endian) else {
            return Vec::new();
        };
        (0..entry.count.min(MAX_IFDS as u32) as usize)
            .filter_map(|i| read_u32(self.bytes, base as usize + i * 4, self.little_endian))
            .map(|v| v as usize)
            .collect()
    }

    fn jpeg_from_entries(&self, entries: &[IfdEntry]) -> Vec<(usize, usize)> {
        let find = |tag: u16| entries.iter().find(|e| e.tag == tag);
        let mut found = Vec::new();

        if let (Some(offset), Some(len)) = (find(TAG_JPEG_OFFSET), find(TAG_JPEG_LENGTH)) {
            if let (Some(offset), Some(len)) = (self.value(offset), self.value(len)) {
                found.push((offset as usize, len as usize));
            }
        }

        let compressed = find(TAG_COMPRESSION)
            .and_then(|e| self.value(e))
            .is_some_and(|c| c == COMPRESSION_JPEG || c == COMPRESSION_JPEG_OLD);
        if compressed {
            if let (Some(offset), Some(len)) = (find(TAG_STRIP_OFFSETS), find(TAG_STRIP_BYTE_COUNTS)) {
                if offset.count == 1 && len.count == 1 {
                    if let (Some(offset), Some(len)) = (self.value(offset), self.value(len)) {
                        found.push((offset as usize, len as usize));
                    }
                }
            }
        }

        found
            .into_iter()
            .filter(|&(offset, len)| is_jpeg_at(self.bytes, offset, len))
            .collect()
    }
}

/// Finds SOI..EOI ranges by scanning for JPEG markers.
fn scan_for_jpegs(bytes: &[u8]) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    let mut i = 0;
    while i + 3 <= bytes.len() {
        if bytes[i] == 0xFF && bytes[i + 1] == 0xD8 && bytes[i + 2] == 0xFF {
            match find_eoi(bytes, i + 2) {
                Some(end) => {
                    let len = end - i;
                    if len >= MIN_SCANNED_JPEG {
                        found.push((i, len));
                    }
                    i = end;
                }
                None => break,
            }
        } else {
            i += 1;
        }
    }
    found
}

/// Position just past the last EOI marker before the next SOI (or EOF).
fn find_eoi(bytes: &[u8], from: usize) -> Option<usize> {
    let mut end = None;
    let mut j = from;
    while j + 2 <= bytes.len() {
        if bytes[j] == 0xFF && bytes[j + 1] == 0xD9 {
            end = Some(j + 2);
        } else if end.is_some() && j + 3 <= bytes.len() && bytes[j..j + 3] == [0xFF, 0xD8, 0xFF] {
            break;
        }
        j += 1;
    }
    end
}
