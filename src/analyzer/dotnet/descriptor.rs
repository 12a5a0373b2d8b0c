//! Output schema and descriptor construction.
//!
//! Converts a matched type or member into the structured descriptor the
//! tools return, including one level of sibling-overload expansion.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analyzer::dotnet::search::SymbolHit;
use crate::analyzer::dotnet::xmldoc::XmlDocResolver;
use crate::error::AnalyzeResult;
use crate::metadata::Assembly;
use crate::metadata::assembly::{
    ParamFlags, member_accessibility, render_constant, type_accessibility,
};
use crate::metadata::signature::{self, MethodSig, TypeNameCtx};
use crate::metadata::tables::Table;

/// The kind of symbol a descriptor describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Type,
    Method,
    Property,
    Field,
}

/// One declared parameter of a callable symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub optional: bool,
    /// Declared literal default; present only for optional parameters.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default_value: Option<String>,
}

/// The structured record describing a matched type or member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolDescriptor {
    pub symbol_name: String,
    pub kind: SymbolKind,
    pub accessibility: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub return_type: Option<String>,
    pub parameters: Vec<ParameterDescriptor>,
    pub generic_args: Vec<String>,
    pub attributes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub documentation: Option<String>,
    pub overloads: Vec<SymbolDescriptor>,
    /// Degraded, non-fatal conditions observed while building this
    /// descriptor (unreadable attribute metadata, malformed doc files).
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub diagnostics: Vec<String>,
}

/// Builds descriptors out of search hits, consulting the XML doc resolver.
pub struct DescriptorBuilder<'a> {
    docs: &'a mut XmlDocResolver,
}

impl<'a> DescriptorBuilder<'a> {
    pub fn new(docs: &'a mut XmlDocResolver) -> Self {
        Self { docs }
    }

    pub fn build(&mut self, hit: &SymbolHit) -> AnalyzeResult<SymbolDescriptor> {
        match hit {
            SymbolHit::Type {
                assembly,
                type_row,
                matched_name,
            } => self.build_type(assembly, *type_row, matched_name),
            SymbolHit::Method {
                assembly,
                type_row,
                method_row,
            } => self.build_method(assembly, *type_row, *method_row, true),
            SymbolHit::Property {
                assembly,
                type_row,
                property_row,
            } => self.build_property(assembly, *type_row, *property_row),
            SymbolHit::Field {
                assembly,
                type_row,
                field_row,
            } => self.build_field(assembly, *type_row, *field_row),
        }
    }

    fn build_type(
        &mut self,
        assembly: &Assembly,
        type_row: u32,
        matched_name: &str,
    ) -> AnalyzeResult<SymbolDescriptor> {
        let mut diagnostics = Vec::new();
        let generic_args = assembly
            .generic_param_names((Table::TypeDef, type_row))
            .unwrap_or_default();
        let attributes = self.read_attributes(assembly, (Table::TypeDef, type_row), &mut diagnostics);
        let documentation =
            self.lookup_doc(assembly, &format!("T:{matched_name}"), &mut diagnostics);

        Ok(SymbolDescriptor {
            symbol_name: matched_name.to_string(),
            kind: SymbolKind::Type,
            accessibility: type_accessibility(assembly.type_flags(type_row)?).to_string(),
            return_type: None,
            parameters: Vec::new(),
            generic_args,
            attributes,
            documentation,
            overloads: Vec::new(),
            diagnostics,
        })
    }

    fn build_method(
        &mut self,
        assembly: &Assembly,
        type_row: u32,
        method_row: u32,
        expand_overloads: bool,
    ) -> AnalyzeResult<SymbolDescriptor> {
        let mut diagnostics = Vec::new();
        let name = assembly.method_name(method_row)?.to_string();
        let declaring = assembly.type_full_name(type_row)?;
        let sig = self.decode_method_sig(assembly, type_row, method_row)?;

        let mut parameters = Vec::new();
        for param_row in assembly.params_of(method_row)? {
            let (flags, sequence, param_name) = assembly.param_info(param_row)?;
            // Sequence 0 is the return-value row; parameters without a
            // resolvable name are skipped.
            if sequence == 0 || param_name.is_empty() {
                continue;
            }
            let Some(param_type) = sig.param_types.get(sequence as usize - 1) else {
                continue;
            };
            let optional = flags.contains(ParamFlags::OPTIONAL);
            let default_value = if optional && flags.contains(ParamFlags::HAS_DEFAULT) {
                assembly
                    .constant_of((Table::Param, param_row))?
                    .and_then(|(elem_type, blob)| render_constant(elem_type, blob))
            } else {
                None
            };
            parameters.push(ParameterDescriptor {
                name: param_name.to_string(),
                param_type: param_type.clone(),
                optional,
                default_value,
            });
        }

        let attributes =
            self.read_attributes(assembly, (Table::MethodDef, method_row), &mut diagnostics);
        let generic_args = assembly
            .generic_param_names((Table::MethodDef, method_row))
            .unwrap_or_default();
        let documentation =
            self.lookup_doc(assembly, &format!("M:{declaring}.{name}"), &mut diagnostics);

        let overloads = if expand_overloads {
            self.expand_overloads(assembly, type_row, method_row, &name, &sig)?
        } else {
            Vec::new()
        };

        Ok(SymbolDescriptor {
            symbol_name: name,
            kind: SymbolKind::Method,
            accessibility: member_accessibility(assembly.method_flags(method_row)?).to_string(),
            return_type: Some(sig.return_type),
            parameters,
            generic_args,
            attributes,
            documentation,
            overloads,
            diagnostics,
        })
    }

    /// Sibling methods of the same declaring type sharing the matched
    /// name, excluding any with an identical parameter-type sequence.
    /// Each sibling's own overload list stays empty (depth cap of one).
    fn expand_overloads(
        &mut self,
        assembly: &Assembly,
        type_row: u32,
        method_row: u32,
        name: &str,
        sig: &MethodSig,
    ) -> AnalyzeResult<Vec<SymbolDescriptor>> {
        let mut overloads = Vec::new();
        for sibling_row in assembly.methods_of(type_row)? {
            if sibling_row == method_row || assembly.method_name(sibling_row)? != name {
                continue;
            }
            let sibling_sig = self.decode_method_sig(assembly, type_row, sibling_row)?;
            if sibling_sig.param_types == sig.param_types {
                continue;
            }
            overloads.push(self.build_method(assembly, type_row, sibling_row, false)?);
        }
        Ok(overloads)
    }

    fn build_property(
        &mut self,
        assembly: &Assembly,
        type_row: u32,
        property_row: u32,
    ) -> AnalyzeResult<SymbolDescriptor> {
        let mut diagnostics = Vec::new();
        let name = assembly.property_name(property_row)?.to_string();
        let declaring = assembly.type_full_name(type_row)?;
        let accessibility = match assembly.property_accessor(property_row)? {
            Some(accessor) => member_accessibility(assembly.method_flags(accessor)?),
            None => "private",
        };
        let attributes =
            self.read_attributes(assembly, (Table::Property, property_row), &mut diagnostics);
        let documentation =
            self.lookup_doc(assembly, &format!("P:{declaring}.{name}"), &mut diagnostics);

        Ok(SymbolDescriptor {
            symbol_name: name,
            kind: SymbolKind::Property,
            accessibility: accessibility.to_string(),
            return_type: None,
            parameters: Vec::new(),
            generic_args: Vec::new(),
            attributes,
            documentation,
            overloads: Vec::new(),
            diagnostics,
        })
    }

    fn build_field(
        &mut self,
        assembly: &Assembly,
        type_row: u32,
        field_row: u32,
    ) -> AnalyzeResult<SymbolDescriptor> {
        let mut diagnostics = Vec::new();
        let name = assembly.field_name(field_row)?.to_string();
        let declaring = assembly.type_full_name(type_row)?;
        let attributes =
            self.read_attributes(assembly, (Table::Field, field_row), &mut diagnostics);
        let documentation =
            self.lookup_doc(assembly, &format!("F:{declaring}.{name}"), &mut diagnostics);

        Ok(SymbolDescriptor {
            symbol_name: name,
            kind: SymbolKind::Field,
            accessibility: member_accessibility(assembly.field_flags(field_row)?).to_string(),
            return_type: None,
            parameters: Vec::new(),
            generic_args: Vec::new(),
            attributes,
            documentation,
            overloads: Vec::new(),
            diagnostics,
        })
    }

    fn decode_method_sig(
        &self,
        assembly: &Assembly,
        type_row: u32,
        method_row: u32,
    ) -> AnalyzeResult<MethodSig> {
        let type_params = assembly
            .generic_param_names((Table::TypeDef, type_row))
            .unwrap_or_default();
        let method_params = assembly
            .generic_param_names((Table::MethodDef, method_row))
            .unwrap_or_default();
        let blob = assembly.method_sig_blob(method_row)?;
        let ctx = TypeNameCtx {
            resolve: &|table, row| assembly.type_name_for_token(table, row),
            type_params: &type_params,
            method_params: &method_params,
        };
        Ok(signature::parse_method_sig(blob, &ctx)?)
    }

    /// Attribute reads are best-effort: a failure yields an empty set and
    /// an observable diagnostic instead of aborting the request.
    fn read_attributes(
        &self,
        assembly: &Assembly,
        parent: (Table, u32),
        diagnostics: &mut Vec<String>,
    ) -> Vec<String> {
        match assembly.custom_attribute_names(parent) {
            Ok(names) => names,
            Err(e) => {
                warn!(assembly = assembly.simple_name(), error = %e, "attribute metadata unreadable");
                diagnostics.push(format!("attribute metadata unreadable: {e}"));
                Vec::new()
            }
        }
    }

    fn lookup_doc(
        &mut self,
        assembly: &Assembly,
        id_prefix: &str,
        diagnostics: &mut Vec<String>,
    ) -> Option<String> {
        let (text, diagnostic) = self.docs.lookup(assembly.path(), id_prefix);
        if let Some(diagnostic) = diagnostic {
            diagnostics.push(diagnostic);
        }
        text
    }
}
