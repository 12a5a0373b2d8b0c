//! Deterministic first-hit symbol search over loaded analysis roots.
//!
//! Search order is fixed: roots in file-name order, TypeDefs in metadata
//! row order, members in row order (methods, properties, fields, nested
//! types). The first match wins and the walk stops — ambiguous unqualified
//! queries resolve silently to whichever candidate enumerates first.
//! Nothing matching anywhere is the defined "symbol not found" outcome.

use std::sync::Arc;

use tracing::debug;

use crate::error::AnalyzeResult;
use crate::metadata::{Assembly, LoadContext};

/// A matched type or member, pinned to its owning assembly.
pub enum SymbolHit {
    Type {
        assembly: Arc<Assembly>,
        type_row: u32,
        /// The full name the query matched against.
        matched_name: String,
    },
    Method {
        assembly: Arc<Assembly>,
        type_row: u32,
        method_row: u32,
    },
    Property {
        assembly: Arc<Assembly>,
        type_row: u32,
        property_row: u32,
    },
    Field {
        assembly: Arc<Assembly>,
        type_row: u32,
        field_row: u32,
    },
}

/// Whether `query` names the member: fully qualified, bare, or as a
/// dotted suffix. Bare and suffix forms are reserved for callables and
/// nested types; other member kinds must be fully qualified.
fn name_matches(query: &str, fq: &str, bare: &str, allow_suffix: bool) -> bool {
    if query == fq {
        return true;
    }
    allow_suffix && (query == bare || query.ends_with(&format!(".{bare}")))
}

/// Walk the context's roots for the first deterministic match.
///
/// Only the build unit's own output binaries are enumerated; symbols that
/// exist solely in the reference set are not found by design.
pub fn find_symbol(context: &LoadContext, query: &str) -> AnalyzeResult<Option<SymbolHit>> {
    for assembly in context.roots() {
        let type_rows: Vec<u32> = assembly.type_rows().collect();
        for type_row in type_rows {
            let full_name = assembly.type_full_name(type_row)?;
            if full_name == query {
                debug!(symbol = %full_name, assembly = assembly.simple_name(), "matched type");
                return Ok(Some(SymbolHit::Type {
                    assembly: Arc::clone(assembly),
                    type_row,
                    matched_name: full_name,
                }));
            }

            for method_row in assembly.methods_of(type_row)? {
                let name = assembly.method_name(method_row)?;
                let fq = format!("{full_name}.{name}");
                if name_matches(query, &fq, name, true) {
                    debug!(symbol = %fq, assembly = assembly.simple_name(), "matched method");
                    return Ok(Some(SymbolHit::Method {
                        assembly: Arc::clone(assembly),
                        type_row,
                        method_row,
                    }));
                }
            }

            for property_row in assembly.properties_of(type_row)? {
                let name = assembly.property_name(property_row)?;
                let fq = format!("{full_name}.{name}");
                if name_matches(query, &fq, name, false) {
                    return Ok(Some(SymbolHit::Property {
                        assembly: Arc::clone(assembly),
                        type_row,
                        property_row,
                    }));
                }
            }

            for field_row in assembly.fields_of(type_row)? {
                let name = assembly.field_name(field_row)?;
                let fq = format!("{full_name}.{name}");
                if name_matches(query, &fq, name, false) {
                    return Ok(Some(SymbolHit::Field {
                        assembly: Arc::clone(assembly),
                        type_row,
                        field_row,
                    }));
                }
            }

            for nested_row in assembly.nested_types(type_row)? {
                let name = assembly.type_name(nested_row)?;
                let nested_full = assembly.type_full_name(nested_row)?;
                if name_matches(query, &nested_full, name, true) {
                    return Ok(Some(SymbolHit::Type {
                        assembly: Arc::clone(assembly),
                        type_row: nested_row,
                        matched_name: nested_full,
                    }));
                }
            }
        }
    }
    debug!(query, "symbol not found in any root");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_matching_requires_dot_boundary() {
        assert!(name_matches("App.Foo.Bar", "App.Foo.Bar", "Bar", true));
        assert!(name_matches("Bar", "App.Foo.Bar", "Bar", true));
        assert!(name_matches("Other.Bar", "App.Foo.Bar", "Bar", true));
        assert!(!name_matches("SugarBar", "App.Foo.Bar", "Bar", true));
        assert!(!name_matches("Bar", "App.Foo.Bar", "Bar", false));
        assert!(name_matches("App.Foo.Bar", "App.Foo.Bar", "Bar", false));
    }
}
