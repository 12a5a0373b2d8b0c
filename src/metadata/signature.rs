//! Signature blob decoding to C#-style display type names.
//!
//! Covers MethodDefSig, FieldSig, PropertySig and the type encodings they
//! embed (ECMA-335 §II.23.2). Generic variables are resolved against the
//! declaring scope's generic parameter names when available.

use super::heaps::read_compressed_u32;
use super::tables::Table;
use super::{MetadataError, MetadataResult};

// ELEMENT_TYPE_* constants (ECMA-335 §II.23.1.16)
pub mod elem {
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0A;
    pub const U8: u8 = 0x0B;
    pub const R4: u8 = 0x0C;
    pub const R8: u8 = 0x0D;
    pub const STRING: u8 = 0x0E;
    pub const PTR: u8 = 0x0F;
    pub const BYREF: u8 = 0x10;
    pub const VALUETYPE: u8 = 0x11;
    pub const CLASS: u8 = 0x12;
    pub const VAR: u8 = 0x13;
    pub const ARRAY: u8 = 0x14;
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    pub const I: u8 = 0x18;
    pub const U: u8 = 0x19;
    pub const FNPTR: u8 = 0x1B;
    pub const OBJECT: u8 = 0x1C;
    pub const SZARRAY: u8 = 0x1D;
    pub const MVAR: u8 = 0x1E;
    pub const CMOD_REQD: u8 = 0x1F;
    pub const CMOD_OPT: u8 = 0x20;
    pub const SENTINEL: u8 = 0x41;
    pub const PINNED: u8 = 0x45;
}

// Calling-convention bits (ECMA-335 §II.23.2.1/3)
pub const SIG_HASTHIS: u8 = 0x20;
pub const SIG_GENERIC: u8 = 0x10;
pub const SIG_KIND_MASK: u8 = 0x0F;
pub const SIG_KIND_FIELD: u8 = 0x06;
pub const SIG_KIND_PROPERTY: u8 = 0x08;

/// Name resolution context for one signature decode.
pub struct TypeNameCtx<'a> {
    /// Resolves a TypeDef/TypeRef/TypeSpec row to a display name.
    pub resolve: &'a dyn Fn(Table, u32) -> String,
    /// Generic parameter names of the declaring type, for `VAR n`.
    pub type_params: &'a [String],
    /// Generic parameter names of the method itself, for `MVAR n`.
    pub method_params: &'a [String],
}

/// A decoded MethodDefSig.
#[derive(Debug, Clone)]
pub struct MethodSig {
    pub has_this: bool,
    pub generic_arity: u32,
    pub return_type: String,
    pub param_types: Vec<String>,
}

/// Map a CLR full type name to its C# keyword where one exists.
pub fn display_name(full_name: &str) -> String {
    let keyword = match full_name {
        "System.Void" => "void",
        "System.Boolean" => "bool",
        "System.Char" => "char",
        "System.SByte" => "sbyte",
        "System.Byte" => "byte",
        "System.Int16" => "short",
        "System.UInt16" => "ushort",
        "System.Int32" => "int",
        "System.UInt32" => "uint",
        "System.Int64" => "long",
        "System.UInt64" => "ulong",
        "System.Single" => "float",
        "System.Double" => "double",
        "System.Decimal" => "decimal",
        "System.String" => "string",
        "System.Object" => "object",
        "System.IntPtr" => "nint",
        "System.UIntPtr" => "nuint",
        _ => return strip_arity(full_name),
    };
    keyword.to_string()
}

/// Drop a generic arity suffix: "List`1" becomes "List".
fn strip_arity(name: &str) -> String {
    match name.rfind('`') {
        Some(pos) if name[pos + 1..].chars().all(|c| c.is_ascii_digit()) => {
            name[..pos].to_string()
        }
        _ => name.to_string(),
    }
}

fn peek(cursor: &[u8]) -> MetadataResult<u8> {
    cursor
        .first()
        .copied()
        .ok_or_else(|| MetadataError::truncated("signature blob"))
}

fn advance(cursor: &mut &[u8]) -> MetadataResult<u8> {
    let byte = peek(cursor)?;
    *cursor = &cursor[1..];
    Ok(byte)
}

/// Decode a TypeDefOrRef coded token embedded in a signature.
fn read_type_token(cursor: &mut &[u8]) -> MetadataResult<(Table, u32)> {
    let coded = read_compressed_u32(cursor)?;
    let table = match coded & 0x03 {
        0 => Table::TypeDef,
        1 => Table::TypeRef,
        2 => Table::TypeSpec,
        _ => return Err(MetadataError::invalid("bad type token tag in signature")),
    };
    Ok((table, coded >> 2))
}

fn skip_custom_mods(cursor: &mut &[u8]) -> MetadataResult<()> {
    while matches!(peek(cursor), Ok(elem::CMOD_REQD) | Ok(elem::CMOD_OPT)) {
        advance(cursor)?;
        read_type_token(cursor)?;
    }
    Ok(())
}

/// Decode one Type encoding into a display name.
pub fn parse_type(cursor: &mut &[u8], ctx: &TypeNameCtx) -> MetadataResult<String> {
    skip_custom_mods(cursor)?;
    let code = advance(cursor)?;
    let name = match code {
        elem::VOID => "void".to_string(),
        elem::BOOLEAN => "bool".to_string(),
        elem::CHAR => "char".to_string(),
        elem::I1 => "sbyte".to_string(),
        elem::U1 => "byte".to_string(),
        elem::I2 => "short".to_string(),
        elem::U2 => "ushort".to_string(),
        elem::I4 => "int".to_string(),
        elem::U4 => "uint".to_string(),
        elem::I8 => "long".to_string(),
        elem::U8 => "ulong".to_string(),
        elem::R4 => "float".to_string(),
        elem::R8 => "double".to_string(),
        elem::STRING => "string".to_string(),
        elem::OBJECT => "object".to_string(),
        elem::I => "nint".to_string(),
        elem::U => "nuint".to_string(),
        elem::TYPEDBYREF => "System.TypedReference".to_string(),
        elem::VALUETYPE | elem::CLASS => {
            let (table, row) = read_type_token(cursor)?;
            display_name(&(ctx.resolve)(table, row))
        }
        elem::VAR => {
            let n = read_compressed_u32(cursor)? as usize;
            ctx.type_params
                .get(n)
                .cloned()
                .unwrap_or_else(|| format!("!{n}"))
        }
        elem::MVAR => {
            let n = read_compressed_u32(cursor)? as usize;
            ctx.method_params
                .get(n)
                .cloned()
                .unwrap_or_else(|| format!("!!{n}"))
        }
        elem::SZARRAY => {
            let element = parse_type(cursor, ctx)?;
            format!("{element}[]")
        }
        elem::ARRAY => {
            let element = parse_type(cursor, ctx)?;
            let rank = read_compressed_u32(cursor)?.max(1);
            let num_sizes = read_compressed_u32(cursor)?;
            for _ in 0..num_sizes {
                read_compressed_u32(cursor)?;
            }
            let num_lo_bounds = read_compressed_u32(cursor)?;
            for _ in 0..num_lo_bounds {
                read_compressed_u32(cursor)?;
            }
            let commas = ",".repeat(rank as usize - 1);
            format!("{element}[{commas}]")
        }
        elem::GENERICINST => {
            let kind = advance(cursor)?;
            if kind != elem::CLASS && kind != elem::VALUETYPE {
                return Err(MetadataError::invalid("malformed generic instantiation"));
            }
            let (table, row) = read_type_token(cursor)?;
            let base = display_name(&(ctx.resolve)(table, row));
            let argc = read_compressed_u32(cursor)?;
            let mut args = Vec::with_capacity(argc as usize);
            for _ in 0..argc {
                args.push(parse_type(cursor, ctx)?);
            }
            format!("{base}<{}>", args.join(", "))
        }
        elem::PTR => {
            if peek(cursor)? == elem::VOID {
                advance(cursor)?;
                "void*".to_string()
            } else {
                format!("{}*", parse_type(cursor, ctx)?)
            }
        }
        elem::BYREF => format!("ref {}", parse_type(cursor, ctx)?),
        elem::PINNED => parse_type(cursor, ctx)?,
        elem::FNPTR => {
            let sig = parse_method_sig_inner(cursor, ctx)?;
            let mut parts = sig.param_types;
            parts.push(sig.return_type);
            format!("delegate*<{}>", parts.join(", "))
        }
        other => {
            return Err(MetadataError::invalid(format!(
                "unrecognized element type {other:#04x} in signature"
            )));
        }
    };
    Ok(name)
}

fn parse_ret_or_param(cursor: &mut &[u8], ctx: &TypeNameCtx) -> MetadataResult<String> {
    skip_custom_mods(cursor)?;
    if peek(cursor)? == elem::BYREF {
        advance(cursor)?;
        return Ok(format!("ref {}", parse_type(cursor, ctx)?));
    }
    parse_type(cursor, ctx)
}

fn parse_method_sig_inner(cursor: &mut &[u8], ctx: &TypeNameCtx) -> MetadataResult<MethodSig> {
    let conv = advance(cursor)?;
    let generic_arity = if conv & SIG_GENERIC != 0 {
        read_compressed_u32(cursor)?
    } else {
        0
    };
    let param_count = read_compressed_u32(cursor)?;
    let return_type = parse_ret_or_param(cursor, ctx)?;
    let mut param_types = Vec::with_capacity(param_count as usize);
    for _ in 0..param_count {
        if peek(cursor)? == elem::SENTINEL {
            advance(cursor)?;
        }
        param_types.push(parse_ret_or_param(cursor, ctx)?);
    }
    Ok(MethodSig {
        has_this: conv & SIG_HASTHIS != 0,
        generic_arity,
        return_type,
        param_types,
    })
}

/// Decode a MethodDefSig blob.
pub fn parse_method_sig(blob: &[u8], ctx: &TypeNameCtx) -> MetadataResult<MethodSig> {
    let mut cursor = blob;
    parse_method_sig_inner(&mut cursor, ctx)
}

/// Decode a FieldSig blob into the field's type name.
pub fn parse_field_sig(blob: &[u8], ctx: &TypeNameCtx) -> MetadataResult<String> {
    let mut cursor = blob;
    let conv = advance(&mut cursor)?;
    if conv & SIG_KIND_MASK != SIG_KIND_FIELD {
        return Err(MetadataError::invalid("not a field signature"));
    }
    parse_type(&mut cursor, ctx)
}

/// Decode a PropertySig blob into the property's type name.
pub fn parse_property_sig(blob: &[u8], ctx: &TypeNameCtx) -> MetadataResult<String> {
    let mut cursor = blob;
    let conv = advance(&mut cursor)?;
    if conv & SIG_KIND_MASK != SIG_KIND_PROPERTY {
        return Err(MetadataError::invalid("not a property signature"));
    }
    // Index parameters follow the property type; callers only need the type.
    let _param_count = read_compressed_u32(&mut cursor)?;
    parse_ret_or_param(&mut cursor, ctx)
}
