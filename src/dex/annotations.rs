//! DEX annotation containers
//!
//! - annotations_directory_item
//! - annotation_set_item
//! - annotation_set_ref_list
//! - annotation_item (wraps EncodedAnnotation)

use crate::dex::encoded_values::EncodedAnnotation;
use crate::dex::error::DexError;
use crate::dex::{read_u1, read_u4};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Build,
    Runtime,
    System,
}

impl TryFrom<u8> for Visibility {
    type Error = DexError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0x00 => Ok(Visibility::Build),
            0x01 => Ok(Visibility::Runtime),
            0x02 => Ok(Visibility::System),
            _ => fail!("Unknown annotation visibility 0x{:02x}", v),
        }
    }
}

/// annotation_item
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationItem {
    pub visibility: Visibility,
    pub annotation: EncodedAnnotation,
}

impl AnnotationItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<AnnotationItem, DexError> {
        let visibility = Visibility::try_from(read_u1(bytes, ix)?)?;
        let annotation = EncodedAnnotation::read(bytes, ix)?;
        Ok(AnnotationItem { visibility, annotation })
    }
}

/// annotation_set_item: offsets (from the start of the file) to `annotation_item`s
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSetItem {
    pub entries: Vec<u32>,
}

impl AnnotationSetItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<AnnotationSetItem, DexError> {
        Ok(AnnotationSetItem { entries: read_offsets(bytes, ix)? })
    }
}

/// annotation_set_ref_list: offsets to `annotation_set_item`s, zero for an empty set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSetRefList {
    pub list: Vec<u32>,
}

impl AnnotationSetRefList {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<AnnotationSetRefList, DexError> {
        Ok(AnnotationSetRefList { list: read_offsets(bytes, ix)? })
    }
}

fn read_offsets(bytes: &[u8], ix: &mut usize) -> Result<Vec<u32>, DexError> {
    let size = read_u4(bytes, ix)? as usize;
    if *ix + size * 4 > bytes.len() {
        fail!("Offset list of {} entries at 0x{:x} runs past the end of the file", size, *ix);
    }
    let mut v = Vec::with_capacity(size);
    for _ in 0..size {
        v.push(read_u4(bytes, ix)?);
    }
    Ok(v)
}

/// One `(member index, annotations offset)` row of a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberAnnotations {
    pub member_idx: u32,
    pub annotations_off: u32,
}

/// annotations_directory_item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationsDirectoryItem {
    /// Offset to the class `annotation_set_item`, or 0 if none
    pub class_annotations_off: u32,
    pub field_annotations: Vec<MemberAnnotations>,
    pub method_annotations: Vec<MemberAnnotations>,
    /// Offsets point at `annotation_set_ref_list`s
    pub parameter_annotations: Vec<MemberAnnotations>,
}

impl AnnotationsDirectoryItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<AnnotationsDirectoryItem, DexError> {
        let class_annotations_off = read_u4(bytes, ix)?;
        let fields_size = read_u4(bytes, ix)? as usize;
        let annotated_methods_size = read_u4(bytes, ix)? as usize;
        let annotated_parameters_size = read_u4(bytes, ix)? as usize;
        if *ix + (fields_size + annotated_methods_size + annotated_parameters_size) * 8 > bytes.len() {
            fail!("Annotations directory at 0x{:x} runs past the end of the file", *ix - 16);
        }

        let mut read_rows = |n: usize| -> Result<Vec<MemberAnnotations>, DexError> {
            let mut v = Vec::with_capacity(n);
            for _ in 0..n {
                v.push(MemberAnnotations { member_idx: read_u4(bytes, ix)?, annotations_off: read_u4(bytes, ix)? });
            }
            Ok(v)
        };

        let field_annotations = read_rows(fields_size)?;
        let method_annotations = read_rows(annotated_methods_size)?;
        let parameter_annotations = read_rows(annotated_parameters_size)?;

        Ok(AnnotationsDirectoryItem {
            class_annotations_off,
            field_annotations,
            method_annotations,
            parameter_annotations,
        })
    }

    pub fn field(&self, field_idx: u32) -> Option<u32> {
        find_row(&self.field_annotations, field_idx)
    }

    pub fn method(&self, method_idx: u32) -> Option<u32> {
        find_row(&self.method_annotations, method_idx)
    }

    pub fn parameters(&self, method_idx: u32) -> Option<u32> {
        find_row(&self.parameter_annotations, method_idx)
    }
}

fn find_row(rows: &[MemberAnnotations], idx: u32) -> Option<u32> {
    rows.iter().find(|r| r.member_idx == idx).map(|r| r.annotations_off).filter(|off| *off != 0)
}
