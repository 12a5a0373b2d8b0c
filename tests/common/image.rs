//! Minimal ECMA-335 image builder for test fixtures.
//!
//! Emits a complete PE32 file with one `.text` section holding the CLI
//! header and a metadata root (`#~`, `#Strings`, `#GUID`, `#Blob`). Row
//! serialization goes through the crate's own table schema and width
//! functions, so builder and reader can never disagree on layout.
//!
//! Fixtures stay tiny: every heap index and row index fits in two bytes,
//! which the width rules guarantee for these row counts.

#![allow(dead_code)]

use std::collections::HashMap;

use dotlens::metadata::heaps::write_compressed_u32;
use dotlens::metadata::tables::{Coded, RowCounts, TABLE_COUNT, Table, col_width, schema};

const SECTION_RVA: u32 = 0x1000;
const SECTION_FILE_OFFSET: u32 = 0x200;
const CLI_HEADER_SIZE: u32 = 72;

/// Signature blob helpers for fixtures.
pub mod sig {
    pub const VOID: &[u8] = &[0x01];
    pub const BOOL: &[u8] = &[0x02];
    pub const INT: &[u8] = &[0x08];
    pub const LONG: &[u8] = &[0x0A];
    pub const DOUBLE: &[u8] = &[0x0D];
    pub const STRING: &[u8] = &[0x0E];

    fn method(conv: u8, ret: &[u8], params: &[&[u8]]) -> Vec<u8> {
        let mut blob = vec![conv, params.len() as u8];
        blob.extend_from_slice(ret);
        for p in params {
            blob.extend_from_slice(p);
        }
        blob
    }

    /// `instance <ret> (<params>)`
    pub fn instance_method(ret: &[u8], params: &[&[u8]]) -> Vec<u8> {
        method(0x20, ret, params)
    }

    /// `static <ret> (<params>)`
    pub fn static_method(ret: &[u8], params: &[&[u8]]) -> Vec<u8> {
        method(0x00, ret, params)
    }

    /// `instance !!0 (<params>)` with one method generic parameter.
    pub fn generic_instance_method(ret: &[u8], params: &[&[u8]], arity: u8) -> Vec<u8> {
        let mut blob = vec![0x20 | 0x10, arity, params.len() as u8];
        blob.extend_from_slice(ret);
        for p in params {
            blob.extend_from_slice(p);
        }
        blob
    }

    pub fn field(ty: &[u8]) -> Vec<u8> {
        let mut blob = vec![0x06];
        blob.extend_from_slice(ty);
        blob
    }

    pub fn property(ty: &[u8]) -> Vec<u8> {
        let mut blob = vec![0x08 | 0x20, 0x00];
        blob.extend_from_slice(ty);
        blob
    }
}

/// Method/type flag shorthands used by fixtures.
pub mod flags {
    pub const TYPE_PUBLIC: u32 = 0x0010_0001; // Public | BeforeFieldInit
    pub const TYPE_INTERNAL: u32 = 0x0010_0000; // NotPublic | BeforeFieldInit
    pub const TYPE_NESTED_PUBLIC: u32 = 0x0010_0002;
    pub const METHOD_PUBLIC: u16 = 0x0086; // Public | HideBySig
    pub const METHOD_PRIVATE: u16 = 0x0081; // Private | HideBySig
    pub const METHOD_PUBLIC_STATIC: u16 = 0x0096; // Public | HideBySig | Static
    pub const FIELD_PUBLIC: u16 = 0x0006;
    pub const PARAM_NONE: u16 = 0x0000;
    pub const PARAM_OPTIONAL_DEFAULT: u16 = 0x1010; // Optional | HasDefault
}

/// One declared parameter of a fixture method.
pub struct ParamSpec {
    pub name: &'static str,
    pub flags: u16,
    /// `(element_type, little-endian value bytes)` constant default.
    pub default: Option<(u8, Vec<u8>)>,
}

pub fn param(name: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        flags: flags::PARAM_NONE,
        default: None,
    }
}

pub fn optional_int_param(name: &'static str, value: i32) -> ParamSpec {
    ParamSpec {
        name,
        flags: flags::PARAM_OPTIONAL_DEFAULT,
        default: Some((0x08, value.to_le_bytes().to_vec())),
    }
}

/// Builds one fixture assembly image.
pub struct ImageBuilder {
    strings: Vec<u8>,
    string_map: HashMap<String, u32>,
    blobs: Vec<u8>,
    rows: [Vec<Vec<u32>>; TABLE_COUNT],
}

impl ImageBuilder {
    pub fn new(assembly_name: &str) -> Self {
        let mut builder = Self {
            strings: vec![0],
            string_map: HashMap::new(),
            blobs: vec![0],
            rows: std::array::from_fn(|_| Vec::new()),
        };
        let module_name = builder.string(&format!("{assembly_name}.dll"));
        builder.push(Table::Module, vec![0, module_name, 1, 0, 0]);
        let name = builder.string(assembly_name);
        builder.push(
            Table::Assembly,
            vec![0x8004, 1, 0, 0, 0, 0, 0, name, 0],
        );
        // Row 1 of TypeDef is the <Module> pseudo-type, as compilers emit.
        let module_type = builder.string("<Module>");
        builder.push(Table::TypeDef, vec![0, module_type, 0, 0, 1, 1]);
        builder
    }

    fn string(&mut self, value: &str) -> u32 {
        if value.is_empty() {
            return 0;
        }
        if let Some(&offset) = self.string_map.get(value) {
            return offset;
        }
        let offset = self.strings.len() as u32;
        self.strings.extend_from_slice(value.as_bytes());
        self.strings.push(0);
        self.string_map.insert(value.to_string(), offset);
        offset
    }

    fn blob(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.blobs.len() as u32;
        write_compressed_u32(&mut self.blobs, bytes.len() as u32);
        self.blobs.extend_from_slice(bytes);
        offset
    }

    fn push(&mut self, table: Table, values: Vec<u32>) -> u32 {
        assert_eq!(
            values.len(),
            schema(table).len(),
            "row shape mismatch for {table:?}"
        );
        self.rows[table.index()].push(values);
        self.rows[table.index()].len() as u32
    }

    fn next_row(&self, table: Table) -> u32 {
        self.rows[table.index()].len() as u32 + 1
    }

    pub fn assembly_ref(&mut self, name: &str) -> u32 {
        let name = self.string(name);
        self.push(Table::AssemblyRef, vec![9, 0, 0, 0, 0, 0, name, 0, 0])
    }

    pub fn type_ref(&mut self, assembly_ref: u32, namespace: &str, name: &str) -> u32 {
        let scope = Coded::ResolutionScope.encode(Table::AssemblyRef, assembly_ref);
        let name = self.string(name);
        let namespace = self.string(namespace);
        self.push(Table::TypeRef, vec![scope, name, namespace])
    }

    /// Start a TypeDef. Members added afterwards (until the next
    /// `begin_class`) belong to it; member rows must stay contiguous.
    pub fn begin_class(
        &mut self,
        namespace: &str,
        name: &str,
        type_flags: u32,
        extends: Option<u32>,
    ) -> u32 {
        let extends = match extends {
            Some(type_ref) => Coded::TypeDefOrRef.encode(Table::TypeRef, type_ref),
            None => 0,
        };
        let field_list = self.next_row(Table::Field);
        let method_list = self.next_row(Table::MethodDef);
        let name = self.string(name);
        let namespace = self.string(namespace);
        self.push(
            Table::TypeDef,
            vec![type_flags, name, namespace, extends, field_list, method_list],
        )
    }

    pub fn add_method(
        &mut self,
        name: &str,
        method_flags: u16,
        signature: &[u8],
        params: &[ParamSpec],
    ) -> u32 {
        let param_list = self.next_row(Table::Param);
        let name = self.string(name);
        let signature = self.blob(signature);
        let method_row = self.push(
            Table::MethodDef,
            vec![0, 0, method_flags as u32, name, signature, param_list],
        );
        for (i, spec) in params.iter().enumerate() {
            let param_name = self.string(spec.name);
            let param_row = self.push(
                Table::Param,
                vec![spec.flags as u32, i as u32 + 1, param_name],
            );
            if let Some((elem_type, value)) = &spec.default {
                let parent = Coded::HasConstant.encode(Table::Param, param_row);
                let value = self.blob(value);
                self.push(Table::Constant, vec![*elem_type as u32, parent, value]);
            }
        }
        method_row
    }

    pub fn add_field(&mut self, name: &str, field_flags: u16, signature: &[u8]) -> u32 {
        let name = self.string(name);
        let signature = self.blob(signature);
        self.push(Table::Field, vec![field_flags as u32, name, signature])
    }

    /// Add a property with an existing accessor method.
    pub fn add_property(
        &mut self,
        type_row: u32,
        name: &str,
        signature: &[u8],
        getter_row: u32,
    ) -> u32 {
        let needs_map = !self.rows[Table::PropertyMap.index()]
            .iter()
            .any(|row| row[0] == type_row);
        if needs_map {
            let property_list = self.next_row(Table::Property);
            self.push(Table::PropertyMap, vec![type_row, property_list]);
        }
        let name = self.string(name);
        let signature = self.blob(signature);
        let property_row = self.push(Table::Property, vec![0, name, signature]);
        let association = Coded::HasSemantics.encode(Table::Property, property_row);
        // 0x0002 = getter
        self.push(Table::MethodSemantics, vec![0x0002, getter_row, association]);
        property_row
    }

    /// A parameterless `.ctor` MemberRef on a TypeRef, for attributes.
    pub fn member_ref_ctor(&mut self, type_ref: u32) -> u32 {
        let class = Coded::MemberRefParent.encode(Table::TypeRef, type_ref);
        let name = self.string(".ctor");
        let signature = self.blob(&[0x20, 0x00, 0x01]);
        self.push(Table::MemberRef, vec![class, name, signature])
    }

    /// Attach a zero-argument custom attribute to a metadata row.
    pub fn attribute(&mut self, parent: (Table, u32), ctor_member_ref: u32) {
        let parent = Coded::HasCustomAttribute.encode(parent.0, parent.1);
        let ctor = Coded::CustomAttributeType.encode(Table::MemberRef, ctor_member_ref);
        // Prolog + zero named arguments.
        let value = self.blob(&[0x01, 0x00, 0x00, 0x00]);
        self.push(Table::CustomAttribute, vec![parent, ctor, value]);
    }

    pub fn generic_param(&mut self, owner: (Table, u32), number: u16, name: &str) {
        let owner = Coded::TypeOrMethodDef.encode(owner.0, owner.1);
        let name = self.string(name);
        self.push(Table::GenericParam, vec![number as u32, 0, owner, name]);
    }

    pub fn nest(&mut self, nested_type: u32, enclosing_type: u32) {
        self.push(Table::NestedClass, vec![nested_type, enclosing_type]);
    }

    /// Serialize the full PE image.
    pub fn build(&self) -> Vec<u8> {
        let metadata = self.build_metadata();
        build_pe(&metadata)
    }

    fn row_counts(&self) -> RowCounts {
        let mut counts = [0u32; TABLE_COUNT];
        for (id, rows) in self.rows.iter().enumerate() {
            counts[id] = rows.len() as u32;
        }
        counts
    }

    fn build_table_stream(&self) -> Vec<u8> {
        let counts = self.row_counts();
        assert!(
            counts.iter().all(|&c| c < 0xFFFF),
            "fixture row counts must stay two-byte"
        );

        let mut valid = 0u64;
        for (id, &count) in counts.iter().enumerate() {
            if count > 0 {
                valid |= 1 << id;
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(&0u32.to_le_bytes()); // reserved
        out.push(2); // major
        out.push(0); // minor
        out.push(0); // heap sizes: all two-byte indices
        out.push(1); // reserved
        out.extend_from_slice(&valid.to_le_bytes());
        out.extend_from_slice(&valid.to_le_bytes()); // sorted mask, unused by the reader
        for &count in counts.iter() {
            if count > 0 {
                out.extend_from_slice(&count.to_le_bytes());
            }
        }

        for id in 0..TABLE_COUNT {
            let table = Table::from_id(id as u8).expect("id within table space");
            let columns = schema(table);
            for row in &self.rows[id] {
                for (col, &value) in columns.iter().zip(row) {
                    match col_width(*col, &counts, 0) {
                        2 => {
                            assert!(value <= 0xFFFF, "value {value} too wide for {table:?}");
                            out.extend_from_slice(&(value as u16).to_le_bytes());
                        }
                        _ => out.extend_from_slice(&value.to_le_bytes()),
                    }
                }
            }
        }
        out
    }

    fn build_metadata(&self) -> Vec<u8> {
        assert!(self.strings.len() < 0x1_0000, "string heap must stay small");
        assert!(self.blobs.len() < 0x1_0000, "blob heap must stay small");

        let tables = self.build_table_stream();
        let guids = [0u8; 16];
        let streams: [(&str, &[u8]); 4] = [
            ("#~", &tables),
            ("#Strings", &self.strings),
            ("#GUID", &guids),
            ("#Blob", &self.blobs),
        ];

        let version = b"v4.0.30319\0\0"; // length padded to a 4-byte boundary
        let header_len: usize = streams
            .iter()
            .map(|(name, _)| 8 + (name.len() + 1).div_ceil(4) * 4)
            .sum();
        let mut data_offset = 16 + version.len() + 4 + header_len;

        let mut out = Vec::new();
        out.extend_from_slice(&0x424A_5342u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // major
        out.extend_from_slice(&1u16.to_le_bytes()); // minor
        out.extend_from_slice(&0u32.to_le_bytes()); // reserved
        out.extend_from_slice(&(version.len() as u32).to_le_bytes());
        out.extend_from_slice(version);
        out.extend_from_slice(&0u16.to_le_bytes()); // flags
        out.extend_from_slice(&(streams.len() as u16).to_le_bytes());

        for (name, content) in &streams {
            out.extend_from_slice(&(data_offset as u32).to_le_bytes());
            out.extend_from_slice(&(content.len() as u32).to_le_bytes());
            let mut name_bytes = name.as_bytes().to_vec();
            name_bytes.push(0);
            while name_bytes.len() % 4 != 0 {
                name_bytes.push(0);
            }
            out.extend_from_slice(&name_bytes);
            data_offset += content.len().div_ceil(4) * 4;
        }
        for (_, content) in &streams {
            out.extend_from_slice(content);
            while out.len() % 4 != 0 {
                out.push(0);
            }
        }
        out
    }
}

/// Wrap a metadata root in a single-section PE32 image.
fn build_pe(metadata: &[u8]) -> Vec<u8> {
    let metadata_rva = SECTION_RVA + CLI_HEADER_SIZE;
    let content_size = CLI_HEADER_SIZE as usize + metadata.len();

    let mut image = vec![0u8; SECTION_FILE_OFFSET as usize];
    // MS-DOS header: magic + e_lfanew
    image[0] = b'M';
    image[1] = b'Z';
    image[0x3C..0x40].copy_from_slice(&0x40u32.to_le_bytes());

    // PE signature + COFF header
    let pe = 0x40;
    image[pe..pe + 4].copy_from_slice(b"PE\0\0");
    let coff = pe + 4;
    image[coff..coff + 2].copy_from_slice(&0x014Cu16.to_le_bytes()); // i386
    image[coff + 2..coff + 4].copy_from_slice(&1u16.to_le_bytes()); // one section
    image[coff + 16..coff + 18].copy_from_slice(&224u16.to_le_bytes()); // optional header size
    image[coff + 18..coff + 20].copy_from_slice(&0x2022u16.to_le_bytes()); // DLL

    // Optional header (PE32)
    let opt = coff + 20;
    image[opt..opt + 2].copy_from_slice(&0x010Bu16.to_le_bytes());
    image[opt + 92..opt + 96].copy_from_slice(&16u32.to_le_bytes()); // data directory count
    let cli_dir = opt + 96 + 14 * 8;
    image[cli_dir..cli_dir + 4].copy_from_slice(&SECTION_RVA.to_le_bytes());
    image[cli_dir + 4..cli_dir + 8].copy_from_slice(&CLI_HEADER_SIZE.to_le_bytes());

    // Section table: one .text section holding everything
    let section = opt + 224;
    image[section..section + 5].copy_from_slice(b".text");
    image[section + 8..section + 12].copy_from_slice(&(content_size as u32).to_le_bytes());
    image[section + 12..section + 16].copy_from_slice(&SECTION_RVA.to_le_bytes());
    image[section + 16..section + 20].copy_from_slice(&(content_size as u32).to_le_bytes());
    image[section + 20..section + 24].copy_from_slice(&SECTION_FILE_OFFSET.to_le_bytes());

    // CLI header
    let cli = image.len();
    image.resize(cli + CLI_HEADER_SIZE as usize, 0);
    image[cli..cli + 4].copy_from_slice(&CLI_HEADER_SIZE.to_le_bytes());
    image[cli + 4..cli + 6].copy_from_slice(&2u16.to_le_bytes());
    image[cli + 6..cli + 8].copy_from_slice(&5u16.to_le_bytes());
    image[cli + 8..cli + 12].copy_from_slice(&metadata_rva.to_le_bytes());
    image[cli + 12..cli + 16].copy_from_slice(&(metadata.len() as u32).to_le_bytes());
    image[cli + 16..cli + 20].copy_from_slice(&1u32.to_le_bytes()); // ILONLY

    image.extend_from_slice(metadata);
    image
}
