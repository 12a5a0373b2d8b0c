//! Per-assembly metadata facade.
//!
//! Wraps one mapped binary and exposes typed accessors over the raw table
//! stream: type enumeration, member ranges, signatures, constants, custom
//! attributes, generic parameters. All row indices are 1-based, matching
//! the ECMA-335 convention; 0 means null.

use std::ops::Range;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use super::heaps::Heaps;
use super::pe::PeImage;
use super::signature::{self, TypeNameCtx};
use super::tables::{Coded, Table, TableStream};
use super::{MetadataError, MetadataResult};

// Column positions used below, per the schemas in `tables`.
mod col {
    pub mod type_def {
        pub const FLAGS: usize = 0;
        pub const NAME: usize = 1;
        pub const NAMESPACE: usize = 2;
        pub const FIELD_LIST: usize = 4;
        pub const METHOD_LIST: usize = 5;
    }
    pub mod type_ref {
        pub const SCOPE: usize = 0;
        pub const NAME: usize = 1;
        pub const NAMESPACE: usize = 2;
    }
    pub mod method_def {
        pub const FLAGS: usize = 2;
        pub const NAME: usize = 3;
        pub const SIGNATURE: usize = 4;
        pub const PARAM_LIST: usize = 5;
    }
    pub mod field {
        pub const FLAGS: usize = 0;
        pub const NAME: usize = 1;
        pub const SIGNATURE: usize = 2;
    }
    pub mod param {
        pub const FLAGS: usize = 0;
        pub const SEQUENCE: usize = 1;
        pub const NAME: usize = 2;
    }
    pub mod property {
        pub const NAME: usize = 1;
        pub const TYPE: usize = 2;
    }
    pub mod property_map {
        pub const PARENT: usize = 0;
        pub const PROPERTY_LIST: usize = 1;
    }
    pub mod constant {
        pub const TYPE: usize = 0;
        pub const PARENT: usize = 1;
        pub const VALUE: usize = 2;
    }
    pub mod custom_attribute {
        pub const PARENT: usize = 0;
        pub const TYPE: usize = 1;
    }
    pub mod member_ref {
        pub const CLASS: usize = 0;
        pub const NAME: usize = 1;
    }
    pub mod nested_class {
        pub const NESTED: usize = 0;
        pub const ENCLOSING: usize = 1;
    }
    pub mod generic_param {
        pub const OWNER: usize = 2;
        pub const NAME: usize = 3;
    }
}

// Attribute flag subsets we interpret (ECMA-335 §II.23.1)
pub const TYPE_VISIBILITY_MASK: u32 = 0x0000_0007;
pub const MEMBER_ACCESS_MASK: u16 = 0x0007;

bitflags::bitflags! {
    /// ParamAttributes bits relevant to descriptors.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ParamFlags: u16 {
        const IN = 0x0001;
        const OUT = 0x0002;
        const OPTIONAL = 0x0010;
        const HAS_DEFAULT = 0x1000;
    }
}

enum AssemblyData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl AssemblyData {
    fn bytes(&self) -> &[u8] {
        match self {
            Self::Mapped(map) => map,
            Self::Owned(vec) => vec,
        }
    }
}

/// One loaded assembly: mapped bytes plus parsed stream/table layout.
pub struct Assembly {
    name: String,
    path: PathBuf,
    data: AssemblyData,
    heaps: Heaps,
    tables: TableStream,
}

impl Assembly {
    /// Map a file read-only and parse its metadata layout. No code from the
    /// binary is ever executed; only the metadata streams are touched.
    pub fn open(path: &Path) -> MetadataResult<Self> {
        let file = std::fs::File::open(path).map_err(|source| MetadataError::Io { source })?;
        // Read-only map; the file is never written through this handle.
        let map = unsafe { Mmap::map(&file) }.map_err(|source| MetadataError::Io { source })?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::parse(name, path.to_path_buf(), AssemblyData::Mapped(map))
    }

    /// Parse an in-memory image; used by tests and fixtures.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> MetadataResult<Self> {
        Self::parse(name.into(), PathBuf::new(), AssemblyData::Owned(bytes))
    }

    fn parse(name: String, path: PathBuf, data: AssemblyData) -> MetadataResult<Self> {
        let bytes = data.bytes();
        let pe = PeImage::parse(bytes)?;
        let metadata = pe.metadata_range(bytes)?;
        let heaps = Heaps::parse(bytes, metadata)?;
        let tables = TableStream::parse(bytes, heaps.tables_range())?;
        Ok(Self {
            name,
            path,
            data,
            heaps,
            tables,
        })
    }

    pub fn simple_name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn bytes(&self) -> &[u8] {
        self.data.bytes()
    }

    pub fn row_count(&self, table: Table) -> u32 {
        self.tables.rows(table)
    }

    fn value(&self, table: Table, row: u32, column: usize) -> MetadataResult<u32> {
        self.tables.value(self.bytes(), table, row, column)
    }

    fn string(&self, index: u32) -> MetadataResult<&str> {
        self.heaps.string(self.bytes(), index)
    }

    fn blob(&self, index: u32) -> MetadataResult<&[u8]> {
        self.heaps.blob(self.bytes(), index)
    }

    // ---- types ----

    /// TypeDef rows excluding the `<Module>` pseudo-type.
    pub fn type_rows(&self) -> impl Iterator<Item = u32> + '_ {
        (1..=self.row_count(Table::TypeDef))
            .filter(|&row| self.type_name(row).map(|n| n != "<Module>").unwrap_or(false))
    }

    pub fn type_name(&self, row: u32) -> MetadataResult<&str> {
        self.string(self.value(Table::TypeDef, row, col::type_def::NAME)?)
    }

    pub fn type_namespace(&self, row: u32) -> MetadataResult<&str> {
        self.string(self.value(Table::TypeDef, row, col::type_def::NAMESPACE)?)
    }

    pub fn type_flags(&self, row: u32) -> MetadataResult<u32> {
        self.value(Table::TypeDef, row, col::type_def::FLAGS)
    }

    /// Full name with nesting chains flattened: `Ns.Outer.Inner`.
    pub fn type_full_name(&self, row: u32) -> MetadataResult<String> {
        let name = self.type_name(row)?;
        if let Some(enclosing) = self.enclosing_type(row)? {
            return Ok(format!("{}.{name}", self.type_full_name(enclosing)?));
        }
        let namespace = self.type_namespace(row)?;
        if namespace.is_empty() {
            Ok(name.to_string())
        } else {
            Ok(format!("{namespace}.{name}"))
        }
    }

    pub fn enclosing_type(&self, row: u32) -> MetadataResult<Option<u32>> {
        for nc in 1..=self.row_count(Table::NestedClass) {
            if self.value(Table::NestedClass, nc, col::nested_class::NESTED)? == row {
                return Ok(Some(self.value(
                    Table::NestedClass,
                    nc,
                    col::nested_class::ENCLOSING,
                )?));
            }
        }
        Ok(None)
    }

    /// TypeDef rows directly nested inside `row`.
    pub fn nested_types(&self, row: u32) -> MetadataResult<Vec<u32>> {
        let mut nested = Vec::new();
        for nc in 1..=self.row_count(Table::NestedClass) {
            if self.value(Table::NestedClass, nc, col::nested_class::ENCLOSING)? == row {
                nested.push(self.value(Table::NestedClass, nc, col::nested_class::NESTED)?);
            }
        }
        Ok(nested)
    }

    // ---- members ----

    /// MethodDef row range owned by a TypeDef (run-to-next-row semantics).
    pub fn methods_of(&self, type_row: u32) -> MetadataResult<Range<u32>> {
        self.member_list(Table::TypeDef, type_row, col::type_def::METHOD_LIST, Table::MethodDef)
    }

    fn member_list(
        &self,
        owner: Table,
        owner_row: u32,
        list_col: usize,
        member: Table,
    ) -> MetadataResult<Range<u32>> {
        let start = self.value(owner, owner_row, list_col)?;
        let end = if owner_row < self.tables.rows(owner) {
            self.value(owner, owner_row + 1, list_col)?
        } else {
            self.tables.rows(member) + 1
        };
        Ok(start..end)
    }

    pub fn method_name(&self, row: u32) -> MetadataResult<&str> {
        self.string(self.value(Table::MethodDef, row, col::method_def::NAME)?)
    }

    pub fn method_flags(&self, row: u32) -> MetadataResult<u16> {
        Ok(self.value(Table::MethodDef, row, col::method_def::FLAGS)? as u16)
    }

    pub fn method_sig_blob(&self, row: u32) -> MetadataResult<&[u8]> {
        self.blob(self.value(Table::MethodDef, row, col::method_def::SIGNATURE)?)
    }

    /// Param rows of a method, including a possible sequence-0 return row.
    pub fn params_of(&self, method_row: u32) -> MetadataResult<Range<u32>> {
        self.member_list(
            Table::MethodDef,
            method_row,
            col::method_def::PARAM_LIST,
            Table::Param,
        )
    }

    pub fn param_info(&self, row: u32) -> MetadataResult<(ParamFlags, u16, &str)> {
        let flags =
            ParamFlags::from_bits_truncate(self.value(Table::Param, row, col::param::FLAGS)? as u16);
        let sequence = self.value(Table::Param, row, col::param::SEQUENCE)? as u16;
        let name = self.string(self.value(Table::Param, row, col::param::NAME)?)?;
        Ok((flags, sequence, name))
    }

    /// Declaring TypeDef of a method, found through the method-list ranges.
    pub fn method_owner(&self, method_row: u32) -> MetadataResult<Option<u32>> {
        for type_row in 1..=self.row_count(Table::TypeDef) {
            if self.methods_of(type_row)?.contains(&method_row) {
                return Ok(Some(type_row));
            }
        }
        Ok(None)
    }

    pub fn fields_of(&self, type_row: u32) -> MetadataResult<Range<u32>> {
        self.member_list(
            Table::TypeDef,
            type_row,
            col::type_def::FIELD_LIST,
            Table::Field,
        )
    }

    pub fn field_name(&self, row: u32) -> MetadataResult<&str> {
        self.string(self.value(Table::Field, row, col::field::NAME)?)
    }

    pub fn field_flags(&self, row: u32) -> MetadataResult<u16> {
        Ok(self.value(Table::Field, row, col::field::FLAGS)? as u16)
    }

    pub fn field_sig_blob(&self, row: u32) -> MetadataResult<&[u8]> {
        self.blob(self.value(Table::Field, row, col::field::SIGNATURE)?)
    }

    /// Property rows of a type, through its PropertyMap entry.
    pub fn properties_of(&self, type_row: u32) -> MetadataResult<Range<u32>> {
        for map_row in 1..=self.row_count(Table::PropertyMap) {
            if self.value(Table::PropertyMap, map_row, col::property_map::PARENT)? == type_row {
                return self.member_list(
                    Table::PropertyMap,
                    map_row,
                    col::property_map::PROPERTY_LIST,
                    Table::Property,
                );
            }
        }
        Ok(1..1)
    }

    pub fn property_name(&self, row: u32) -> MetadataResult<&str> {
        self.string(self.value(Table::Property, row, col::property::NAME)?)
    }

    pub fn property_sig_blob(&self, row: u32) -> MetadataResult<&[u8]> {
        self.blob(self.value(Table::Property, row, col::property::TYPE)?)
    }

    /// First accessor method associated with a property, via MethodSemantics.
    pub fn property_accessor(&self, property_row: u32) -> MetadataResult<Option<u32>> {
        let coded = Coded::HasSemantics.encode(Table::Property, property_row);
        for row in 1..=self.row_count(Table::MethodSemantics) {
            if self.value(Table::MethodSemantics, row, 2)? == coded {
                return Ok(Some(self.value(Table::MethodSemantics, row, 1)?));
            }
        }
        Ok(None)
    }

    // ---- constants, attributes, generics ----

    /// Literal default attached to a Field/Param/Property row, if any.
    pub fn constant_of(&self, parent: (Table, u32)) -> MetadataResult<Option<(u8, &[u8])>> {
        let coded = Coded::HasConstant.encode(parent.0, parent.1);
        for row in 1..=self.row_count(Table::Constant) {
            if self.value(Table::Constant, row, col::constant::PARENT)? == coded {
                let elem_type = (self.value(Table::Constant, row, col::constant::TYPE)? & 0xFF) as u8;
                let value = self.blob(self.value(Table::Constant, row, col::constant::VALUE)?)?;
                return Ok(Some((elem_type, value)));
            }
        }
        Ok(None)
    }

    /// Attribute type simple names attached to a metadata row.
    ///
    /// Any failure while walking attribute metadata is surfaced to the
    /// caller as the error; the descriptor layer records it as a
    /// diagnostic rather than failing the request.
    pub fn custom_attribute_names(&self, parent: (Table, u32)) -> MetadataResult<Vec<String>> {
        let coded = Coded::HasCustomAttribute.encode(parent.0, parent.1);
        let mut names = Vec::new();
        for row in 1..=self.row_count(Table::CustomAttribute) {
            if self.value(Table::CustomAttribute, row, col::custom_attribute::PARENT)? != coded {
                continue;
            }
            let ctor = self.value(Table::CustomAttribute, row, col::custom_attribute::TYPE)?;
            let (table, ctor_row) = Coded::CustomAttributeType
                .decode(ctor)
                .ok_or_else(|| MetadataError::invalid("bad custom attribute constructor"))?;
            let name = match table {
                Table::MethodDef => match self.method_owner(ctor_row)? {
                    Some(owner) => self.type_name(owner)?.to_string(),
                    None => continue,
                },
                Table::MemberRef => {
                    let class = self.value(Table::MemberRef, ctor_row, col::member_ref::CLASS)?;
                    match Coded::MemberRefParent.decode(class) {
                        Some((Table::TypeRef, type_row)) => {
                            self.type_ref_name(type_row)?.1.to_string()
                        }
                        Some((Table::TypeDef, type_row)) => self.type_name(type_row)?.to_string(),
                        _ => continue,
                    }
                }
                _ => continue,
            };
            names.push(name);
        }
        Ok(names)
    }

    /// Generic parameter names of a TypeDef or MethodDef owner, in
    /// declaration order.
    pub fn generic_param_names(&self, owner: (Table, u32)) -> MetadataResult<Vec<String>> {
        let coded = Coded::TypeOrMethodDef.encode(owner.0, owner.1);
        let mut names = Vec::new();
        for row in 1..=self.row_count(Table::GenericParam) {
            if self.value(Table::GenericParam, row, col::generic_param::OWNER)? == coded {
                names.push(
                    self.string(self.value(Table::GenericParam, row, col::generic_param::NAME)?)?
                        .to_string(),
                );
            }
        }
        Ok(names)
    }

    // ---- token resolution for signatures ----

    fn type_ref_name(&self, row: u32) -> MetadataResult<(String, &str)> {
        let name = self.string(self.value(Table::TypeRef, row, col::type_ref::NAME)?)?;
        let namespace = self.string(self.value(Table::TypeRef, row, col::type_ref::NAMESPACE)?)?;
        let scope = self.value(Table::TypeRef, row, col::type_ref::SCOPE)?;
        // A TypeRef nested in another TypeRef carries its parent as scope.
        if let Some((Table::TypeRef, parent)) = Coded::ResolutionScope.decode(scope)
            && parent != 0
        {
            let (parent_full, _) = self.type_ref_name(parent)?;
            return Ok((format!("{parent_full}.{name}"), name));
        }
        let full = if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{namespace}.{name}")
        };
        Ok((full, name))
    }

    /// Display name for a TypeDef/TypeRef/TypeSpec token in a signature.
    pub fn type_name_for_token(&self, table: Table, row: u32) -> String {
        let resolved = match table {
            Table::TypeDef => self.type_full_name(row),
            Table::TypeRef => self.type_ref_name(row).map(|(full, _)| full),
            Table::TypeSpec => self
                .blob(self.value(Table::TypeSpec, row, 0).unwrap_or(0))
                .and_then(|blob| {
                    let mut cursor = blob;
                    signature::parse_type(
                        &mut cursor,
                        &TypeNameCtx {
                            resolve: &|t, r| self.type_name_for_token(t, r),
                            type_params: &[],
                            method_params: &[],
                        },
                    )
                }),
            _ => Ok(String::from("?")),
        };
        resolved.unwrap_or_else(|_| String::from("?"))
    }
}

/// Render a Constant-table literal as C# source text.
pub fn render_constant(elem_type: u8, value: &[u8]) -> Option<String> {
    use super::signature::elem;

    fn le<const N: usize>(value: &[u8]) -> Option<[u8; N]> {
        value.get(..N)?.try_into().ok()
    }

    match elem_type {
        elem::BOOLEAN => Some(if *value.first()? != 0 { "true" } else { "false" }.to_string()),
        elem::CHAR => {
            let code = u16::from_le_bytes(le::<2>(value)?);
            Some(char::from_u32(code as u32)?.to_string())
        }
        elem::I1 => Some((le::<1>(value)?[0] as i8).to_string()),
        elem::U1 => Some(le::<1>(value)?[0].to_string()),
        elem::I2 => Some(i16::from_le_bytes(le::<2>(value)?).to_string()),
        elem::U2 => Some(u16::from_le_bytes(le::<2>(value)?).to_string()),
        elem::I4 => Some(i32::from_le_bytes(le::<4>(value)?).to_string()),
        elem::U4 => Some(u32::from_le_bytes(le::<4>(value)?).to_string()),
        elem::I8 => Some(i64::from_le_bytes(le::<8>(value)?).to_string()),
        elem::U8 => Some(u64::from_le_bytes(le::<8>(value)?).to_string()),
        elem::R4 => Some(f32::from_le_bytes(le::<4>(value)?).to_string()),
        elem::R8 => Some(f64::from_le_bytes(le::<8>(value)?).to_string()),
        elem::STRING => {
            let units: Vec<u16> = value
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            Some(String::from_utf16_lossy(&units))
        }
        // ELEMENT_TYPE_CLASS with a zero word encodes a null reference.
        elem::CLASS => Some("null".to_string()),
        _ => None,
    }
}

/// Map member-access bits to the lowercase C# accessibility name.
pub fn member_accessibility(flags: u16) -> &'static str {
    match flags & MEMBER_ACCESS_MASK {
        0x0001 => "private",
        0x0002 => "private protected",
        0x0003 => "internal",
        0x0004 => "protected",
        0x0005 => "protected internal",
        0x0006 => "public",
        _ => "private",
    }
}

/// Map TypeAttributes visibility bits to the lowercase C# accessibility name.
pub fn type_accessibility(flags: u32) -> &'static str {
    match flags & TYPE_VISIBILITY_MASK {
        0x0 => "internal",         // NotPublic
        0x1 => "public",           // Public
        0x2 => "public",           // NestedPublic
        0x3 => "private",          // NestedPrivate
        0x4 => "protected",        // NestedFamily
        0x5 => "internal",         // NestedAssembly
        0x6 => "private protected", // NestedFamANDAssem
        0x7 => "protected internal", // NestedFamORAssem
        _ => unreachable!(),
    }
}
