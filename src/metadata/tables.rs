//! ECMA-335 `#~` table stream: schemas, index widths, row access.
//!
//! The schema and width logic is public so fixture builders can emit rows
//! through exactly the layout the reader computes.

use super::{MetadataError, MetadataResult, u16_at, u32_at, u64_at};
use std::ops::Range;

/// Number of table slots in the `Valid` bitmask we understand (0x00..=0x2C).
pub const TABLE_COUNT: usize = 0x2D;

/// Metadata tables, ECMA-335 §II.22. The discriminant is the table id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Table {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    FieldPtr = 0x03,
    Field = 0x04,
    MethodPtr = 0x05,
    MethodDef = 0x06,
    ParamPtr = 0x07,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0A,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    FieldMarshal = 0x0D,
    DeclSecurity = 0x0E,
    ClassLayout = 0x0F,
    FieldLayout = 0x10,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    EventPtr = 0x13,
    Event = 0x14,
    PropertyMap = 0x15,
    PropertyPtr = 0x16,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1A,
    TypeSpec = 0x1B,
    ImplMap = 0x1C,
    FieldRva = 0x1D,
    EncLog = 0x1E,
    EncMap = 0x1F,
    Assembly = 0x20,
    AssemblyProcessor = 0x21,
    AssemblyOs = 0x22,
    AssemblyRef = 0x23,
    AssemblyRefProcessor = 0x24,
    AssemblyRefOs = 0x25,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    NestedClass = 0x29,
    GenericParam = 0x2A,
    MethodSpec = 0x2B,
    GenericParamConstraint = 0x2C,
}

impl Table {
    pub fn from_id(id: u8) -> Option<Self> {
        ALL_TABLES.get(id as usize).copied()
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

const ALL_TABLES: [Table; TABLE_COUNT] = [
    Table::Module,
    Table::TypeRef,
    Table::TypeDef,
    Table::FieldPtr,
    Table::Field,
    Table::MethodPtr,
    Table::MethodDef,
    Table::ParamPtr,
    Table::Param,
    Table::InterfaceImpl,
    Table::MemberRef,
    Table::Constant,
    Table::CustomAttribute,
    Table::FieldMarshal,
    Table::DeclSecurity,
    Table::ClassLayout,
    Table::FieldLayout,
    Table::StandAloneSig,
    Table::EventMap,
    Table::EventPtr,
    Table::Event,
    Table::PropertyMap,
    Table::PropertyPtr,
    Table::Property,
    Table::MethodSemantics,
    Table::MethodImpl,
    Table::ModuleRef,
    Table::TypeSpec,
    Table::ImplMap,
    Table::FieldRva,
    Table::EncLog,
    Table::EncMap,
    Table::Assembly,
    Table::AssemblyProcessor,
    Table::AssemblyOs,
    Table::AssemblyRef,
    Table::AssemblyRefProcessor,
    Table::AssemblyRefOs,
    Table::File,
    Table::ExportedType,
    Table::ManifestResource,
    Table::NestedClass,
    Table::GenericParam,
    Table::MethodSpec,
    Table::GenericParamConstraint,
];

/// Coded index families, ECMA-335 §II.24.2.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coded {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

impl Coded {
    pub fn tag_bits(self) -> u32 {
        match self {
            Self::TypeDefOrRef => 2,
            Self::HasConstant => 2,
            Self::HasCustomAttribute => 5,
            Self::HasFieldMarshal => 1,
            Self::HasDeclSecurity => 2,
            Self::MemberRefParent => 3,
            Self::HasSemantics => 1,
            Self::MethodDefOrRef => 1,
            Self::MemberForwarded => 1,
            Self::Implementation => 2,
            Self::CustomAttributeType => 3,
            Self::ResolutionScope => 2,
            Self::TypeOrMethodDef => 1,
        }
    }

    /// Tag-ordered member tables; `None` marks an unused tag value.
    pub fn tables(self) -> &'static [Option<Table>] {
        match self {
            Self::TypeDefOrRef => &[
                Some(Table::TypeDef),
                Some(Table::TypeRef),
                Some(Table::TypeSpec),
            ],
            Self::HasConstant => &[
                Some(Table::Field),
                Some(Table::Param),
                Some(Table::Property),
            ],
            Self::HasCustomAttribute => &[
                Some(Table::MethodDef),
                Some(Table::Field),
                Some(Table::TypeRef),
                Some(Table::TypeDef),
                Some(Table::Param),
                Some(Table::InterfaceImpl),
                Some(Table::MemberRef),
                Some(Table::Module),
                Some(Table::DeclSecurity),
                Some(Table::Property),
                Some(Table::Event),
                Some(Table::StandAloneSig),
                Some(Table::ModuleRef),
                Some(Table::TypeSpec),
                Some(Table::Assembly),
                Some(Table::AssemblyRef),
                Some(Table::File),
                Some(Table::ExportedType),
                Some(Table::ManifestResource),
                Some(Table::GenericParam),
                Some(Table::GenericParamConstraint),
                Some(Table::MethodSpec),
            ],
            Self::HasFieldMarshal => &[Some(Table::Field), Some(Table::Param)],
            Self::HasDeclSecurity => &[
                Some(Table::TypeDef),
                Some(Table::MethodDef),
                Some(Table::Assembly),
            ],
            Self::MemberRefParent => &[
                Some(Table::TypeDef),
                Some(Table::TypeRef),
                Some(Table::ModuleRef),
                Some(Table::MethodDef),
                Some(Table::TypeSpec),
            ],
            Self::HasSemantics => &[Some(Table::Event), Some(Table::Property)],
            Self::MethodDefOrRef => &[Some(Table::MethodDef), Some(Table::MemberRef)],
            Self::MemberForwarded => &[Some(Table::Field), Some(Table::MethodDef)],
            Self::Implementation => &[
                Some(Table::File),
                Some(Table::AssemblyRef),
                Some(Table::ExportedType),
            ],
            Self::CustomAttributeType => &[
                None,
                None,
                Some(Table::MethodDef),
                Some(Table::MemberRef),
                None,
            ],
            Self::ResolutionScope => &[
                Some(Table::Module),
                Some(Table::ModuleRef),
                Some(Table::AssemblyRef),
                Some(Table::TypeRef),
            ],
            Self::TypeOrMethodDef => &[Some(Table::TypeDef), Some(Table::MethodDef)],
        }
    }

    /// Decode a coded value into (table, 1-based row). Zero rows mean null.
    pub fn decode(self, value: u32) -> Option<(Table, u32)> {
        let bits = self.tag_bits();
        let tag = (value & ((1 << bits) - 1)) as usize;
        let row = value >> bits;
        let table = (*self.tables().get(tag)?)?;
        Some((table, row))
    }

    /// Encode (table, 1-based row) into a coded value.
    pub fn encode(self, table: Table, row: u32) -> u32 {
        let tag = self
            .tables()
            .iter()
            .position(|t| *t == Some(table))
            .expect("table is not a member of this coded index family");
        (row << self.tag_bits()) | tag as u32
    }
}

/// Column kinds a table row can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Col {
    U16,
    U32,
    Str,
    Guid,
    Blob,
    Row(Table),
    Coded(Coded),
}

/// Column layout per table, ECMA-335 §II.22.
pub fn schema(table: Table) -> &'static [Col] {
    use Col::*;
    match table {
        Table::Module => &[U16, Str, Guid, Guid, Guid],
        Table::TypeRef => &[Coded(self::Coded::ResolutionScope), Str, Str],
        Table::TypeDef => &[
            U32,
            Str,
            Str,
            Coded(self::Coded::TypeDefOrRef),
            Row(Table::Field),
            Row(Table::MethodDef),
        ],
        Table::FieldPtr => &[Row(Table::Field)],
        Table::Field => &[U16, Str, Blob],
        Table::MethodPtr => &[Row(Table::MethodDef)],
        Table::MethodDef => &[U32, U16, U16, Str, Blob, Row(Table::Param)],
        Table::ParamPtr => &[Row(Table::Param)],
        Table::Param => &[U16, U16, Str],
        Table::InterfaceImpl => &[Row(Table::TypeDef), Coded(self::Coded::TypeDefOrRef)],
        Table::MemberRef => &[Coded(self::Coded::MemberRefParent), Str, Blob],
        Table::Constant => &[U16, Coded(self::Coded::HasConstant), Blob],
        Table::CustomAttribute => &[
            Coded(self::Coded::HasCustomAttribute),
            Coded(self::Coded::CustomAttributeType),
            Blob,
        ],
        Table::FieldMarshal => &[Coded(self::Coded::HasFieldMarshal), Blob],
        Table::DeclSecurity => &[U16, Coded(self::Coded::HasDeclSecurity), Blob],
        Table::ClassLayout => &[U16, U32, Row(Table::TypeDef)],
        Table::FieldLayout => &[U32, Row(Table::Field)],
        Table::StandAloneSig => &[Blob],
        Table::EventMap => &[Row(Table::TypeDef), Row(Table::Event)],
        Table::EventPtr => &[Row(Table::Event)],
        Table::Event => &[U16, Str, Coded(self::Coded::TypeDefOrRef)],
        Table::PropertyMap => &[Row(Table::TypeDef), Row(Table::Property)],
        Table::PropertyPtr => &[Row(Table::Property)],
        Table::Property => &[U16, Str, Blob],
        Table::MethodSemantics => &[U16, Row(Table::MethodDef), Coded(self::Coded::HasSemantics)],
        Table::MethodImpl => &[
            Row(Table::TypeDef),
            Coded(self::Coded::MethodDefOrRef),
            Coded(self::Coded::MethodDefOrRef),
        ],
        Table::ModuleRef => &[Str],
        Table::TypeSpec => &[Blob],
        Table::ImplMap => &[
            U16,
            Coded(self::Coded::MemberForwarded),
            Str,
            Row(Table::ModuleRef),
        ],
        Table::FieldRva => &[U32, Row(Table::Field)],
        Table::EncLog => &[U32, U32],
        Table::EncMap => &[U32],
        Table::Assembly => &[U32, U16, U16, U16, U16, U32, Blob, Str, Str],
        Table::AssemblyProcessor => &[U32],
        Table::AssemblyOs => &[U32, U32, U32],
        Table::AssemblyRef => &[U16, U16, U16, U16, U32, Blob, Str, Str, Blob],
        Table::AssemblyRefProcessor => &[U32, Row(Table::AssemblyRef)],
        Table::AssemblyRefOs => &[U32, U32, U32, Row(Table::AssemblyRef)],
        Table::File => &[U32, Str, Blob],
        Table::ExportedType => &[U32, U32, Str, Str, Coded(self::Coded::Implementation)],
        Table::ManifestResource => &[U32, U32, Str, Coded(self::Coded::Implementation)],
        Table::NestedClass => &[Row(Table::TypeDef), Row(Table::TypeDef)],
        Table::GenericParam => &[U16, U16, Coded(self::Coded::TypeOrMethodDef), Str],
        Table::MethodSpec => &[Coded(self::Coded::MethodDefOrRef), Blob],
        Table::GenericParamConstraint => &[
            Row(Table::GenericParam),
            Coded(self::Coded::TypeDefOrRef),
        ],
    }
}

/// Per-table row counts, indexed by table id.
pub type RowCounts = [u32; TABLE_COUNT];

/// Width in bytes of one column under the given row counts and heap flags.
pub fn col_width(col: Col, rows: &RowCounts, heap_sizes: u8) -> usize {
    match col {
        Col::U16 => 2,
        Col::U32 => 4,
        Col::Str => {
            if heap_sizes & 0x01 != 0 {
                4
            } else {
                2
            }
        }
        Col::Guid => {
            if heap_sizes & 0x02 != 0 {
                4
            } else {
                2
            }
        }
        Col::Blob => {
            if heap_sizes & 0x04 != 0 {
                4
            } else {
                2
            }
        }
        Col::Row(t) => {
            if rows[t.index()] > 0xFFFF {
                4
            } else {
                2
            }
        }
        Col::Coded(c) => {
            let max = c
                .tables()
                .iter()
                .flatten()
                .map(|t| rows[t.index()])
                .max()
                .unwrap_or(0);
            if max >= (1u32 << (16 - c.tag_bits())) {
                4
            } else {
                2
            }
        }
    }
}

/// Size in bytes of one row of the given table.
pub fn row_size(table: Table, rows: &RowCounts, heap_sizes: u8) -> usize {
    schema(table)
        .iter()
        .map(|&c| col_width(c, rows, heap_sizes))
        .sum()
}

/// Parsed `#~` stream: row counts plus absolute offsets of each table's rows.
#[derive(Debug, Clone)]
pub struct TableStream {
    heap_sizes: u8,
    row_counts: RowCounts,
    table_offsets: [usize; TABLE_COUNT],
}

impl TableStream {
    /// Parse the `#~` stream found at `range` within `data`.
    pub fn parse(data: &[u8], range: Range<usize>) -> MetadataResult<Self> {
        let base = range.start;
        let heap_sizes = *data
            .get(base + 6)
            .ok_or_else(|| MetadataError::truncated("table stream header"))?;
        let valid = u64_at(data, base + 8)?;

        for id in TABLE_COUNT..64 {
            if valid & (1u64 << id) != 0 {
                return Err(MetadataError::UnsupportedTable { id: id as u8 });
            }
        }

        let mut row_counts = [0u32; TABLE_COUNT];
        let mut cursor = base + 24;
        for (id, count) in row_counts.iter_mut().enumerate() {
            if valid & (1u64 << id) != 0 {
                *count = u32_at(data, cursor)?;
                cursor += 4;
            }
        }

        let mut table_offsets = [0usize; TABLE_COUNT];
        for (id, offset) in table_offsets.iter_mut().enumerate() {
            *offset = cursor;
            let table = Table::from_id(id as u8).expect("id within table space");
            cursor += row_counts[id] as usize * row_size(table, &row_counts, heap_sizes);
        }
        if cursor > range.end {
            return Err(MetadataError::truncated("table rows extend past stream"));
        }

        Ok(Self {
            heap_sizes,
            row_counts,
            table_offsets,
        })
    }

    pub fn heap_sizes(&self) -> u8 {
        self.heap_sizes
    }

    pub fn rows(&self, table: Table) -> u32 {
        self.row_counts[table.index()]
    }

    /// Read column `col` of 1-based `row` in `table` as a widened u32.
    pub fn value(&self, data: &[u8], table: Table, row: u32, col: usize) -> MetadataResult<u32> {
        let count = self.rows(table);
        if row == 0 || row > count {
            return Err(MetadataError::invalid(format!(
                "row {row} out of range for {table:?} ({count} rows)"
            )));
        }
        let cols = schema(table);
        let mut offset = self.table_offsets[table.index()]
            + (row - 1) as usize * row_size(table, &self.row_counts, self.heap_sizes);
        for &c in &cols[..col] {
            offset += col_width(c, &self.row_counts, self.heap_sizes);
        }
        match col_width(cols[col], &self.row_counts, self.heap_sizes) {
            2 => Ok(u16_at(data, offset)? as u32),
            _ => u32_at(data, offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coded_index_round_trips() {
        let coded = Coded::CustomAttributeType;
        let value = coded.encode(Table::MemberRef, 7);
        assert_eq!(coded.decode(value), Some((Table::MemberRef, 7)));

        let coded = Coded::TypeDefOrRef;
        let value = coded.encode(Table::TypeRef, 3);
        assert_eq!(coded.decode(value), Some((Table::TypeRef, 3)));
    }

    #[test]
    fn small_images_use_two_byte_indices() {
        let rows = [10u32; TABLE_COUNT];
        assert_eq!(col_width(Col::Str, &rows, 0), 2);
        assert_eq!(col_width(Col::Row(Table::MethodDef), &rows, 0), 2);
        assert_eq!(col_width(Col::Coded(Coded::HasCustomAttribute), &rows, 0), 2);
    }

    #[test]
    fn large_row_counts_widen_indices() {
        let mut rows = [0u32; TABLE_COUNT];
        rows[Table::MethodDef.index()] = 0x1_0000;
        assert_eq!(col_width(Col::Row(Table::MethodDef), &rows, 0), 4);
        // 5 tag bits leave 11 bits of row space before widening.
        rows[Table::MethodDef.index()] = 1 << 11;
        assert_eq!(col_width(Col::Coded(Coded::HasCustomAttribute), &rows, 0), 4);
        assert_eq!(col_width(Col::Str, &rows, 0x01), 4);
    }

    #[test]
    fn typedef_row_size_under_small_counts() {
        let rows = [1u32; TABLE_COUNT];
        // Flags(4) + Name(2) + Namespace(2) + Extends(2) + FieldList(2) + MethodList(2)
        assert_eq!(row_size(Table::TypeDef, &rows, 0), 14);
    }
}
