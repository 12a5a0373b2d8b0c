//! Metadata reader tests over fixture images.

mod common;

use common::image::{ImageBuilder, flags, optional_int_param, param, sig};
use common::{TestProject, default_app_image};

use dotlens::metadata::tables::Table;
use dotlens::metadata::{Assembly, LoadContext};

#[test]
fn fixture_image_parses_and_enumerates_types() {
    let assembly = Assembly::from_bytes("AppLib", default_app_image()).unwrap();
    let types: Vec<String> = assembly
        .type_rows()
        .map(|row| assembly.type_full_name(row).unwrap())
        .collect();
    assert_eq!(types, vec!["MyApp.Foo"]);
}

#[test]
fn methods_and_params_come_back_in_declaration_order() {
    let assembly = Assembly::from_bytes("AppLib", default_app_image()).unwrap();
    let type_row = assembly.type_rows().next().unwrap();
    let methods: Vec<String> = assembly
        .methods_of(type_row)
        .unwrap()
        .map(|m| assembly.method_name(m).unwrap().to_string())
        .collect();
    assert_eq!(methods, vec!["Bar", "Bar", "Hidden"]);

    let first_bar = assembly.methods_of(type_row).unwrap().next().unwrap();
    let params: Vec<String> = assembly
        .params_of(first_bar)
        .unwrap()
        .map(|p| assembly.param_info(p).unwrap().2.to_string())
        .collect();
    assert_eq!(params, vec!["x"]);
}

#[test]
fn optional_param_constants_are_found() {
    let mut image = ImageBuilder::new("Opt");
    let runtime = image.assembly_ref("System.Runtime");
    let object = image.type_ref(runtime, "System", "Object");
    image.begin_class("MyApp", "Calc", flags::TYPE_PUBLIC, Some(object));
    let method = image.add_method(
        "Scale",
        flags::METHOD_PUBLIC,
        &sig::instance_method(sig::INT, &[sig::INT, sig::INT]),
        &[param("value"), optional_int_param("factor", 2)],
    );

    let assembly = Assembly::from_bytes("Opt", image.build()).unwrap();
    let params: Vec<u32> = assembly.params_of(method).unwrap().collect();
    assert_eq!(params.len(), 2);

    let (flags0, _, _) = assembly.param_info(params[0]).unwrap();
    assert!(!flags0.contains(dotlens::metadata::assembly::ParamFlags::OPTIONAL));

    let (flags1, _, name1) = assembly.param_info(params[1]).unwrap();
    assert!(flags1.contains(dotlens::metadata::assembly::ParamFlags::OPTIONAL));
    assert_eq!(name1, "factor");

    let (elem_type, blob) = assembly
        .constant_of((Table::Param, params[1]))
        .unwrap()
        .expect("constant row");
    assert_eq!(
        dotlens::metadata::assembly::render_constant(elem_type, blob),
        Some("2".to_string())
    );
}

#[test]
fn custom_attributes_resolve_to_type_names() {
    let mut image = ImageBuilder::new("Attrs");
    let runtime = image.assembly_ref("System.Runtime");
    let object = image.type_ref(runtime, "System", "Object");
    let obsolete = image.type_ref(runtime, "System", "ObsoleteAttribute");
    let ctor = image.member_ref_ctor(obsolete);
    image.begin_class("MyApp", "Legacy", flags::TYPE_PUBLIC, Some(object));
    let method = image.add_method(
        "Old",
        flags::METHOD_PUBLIC,
        &sig::instance_method(sig::VOID, &[]),
        &[],
    );
    image.attribute((Table::MethodDef, method), ctor);

    let assembly = Assembly::from_bytes("Attrs", image.build()).unwrap();
    let names = assembly
        .custom_attribute_names((Table::MethodDef, method))
        .unwrap();
    assert_eq!(names, vec!["ObsoleteAttribute"]);
    // Other rows carry no attributes.
    let type_row = assembly.type_rows().next().unwrap();
    assert!(assembly
        .custom_attribute_names((Table::TypeDef, type_row))
        .unwrap()
        .is_empty());
}

#[test]
fn generic_params_and_nested_types_are_visible() {
    let mut image = ImageBuilder::new("Gen");
    let runtime = image.assembly_ref("System.Runtime");
    let object = image.type_ref(runtime, "System", "Object");
    let outer = image.begin_class("MyApp", "Box", flags::TYPE_PUBLIC, Some(object));
    image.generic_param((Table::TypeDef, outer), 0, "T");
    let inner = image.begin_class("", "Lid", flags::TYPE_NESTED_PUBLIC, Some(object));
    image.nest(inner, outer);

    let assembly = Assembly::from_bytes("Gen", image.build()).unwrap();
    assert_eq!(
        assembly.generic_param_names((Table::TypeDef, outer)).unwrap(),
        vec!["T"]
    );
    assert_eq!(assembly.type_full_name(inner).unwrap(), "MyApp.Box.Lid");
    assert_eq!(assembly.nested_types(outer).unwrap(), vec![inner]);
}

#[test]
fn field_and_property_signatures_decode_through_the_facade() {
    let mut image = ImageBuilder::new("Sig");
    let runtime = image.assembly_ref("System.Runtime");
    let object = image.type_ref(runtime, "System", "Object");
    let widget = image.begin_class("MyApp", "Widget", flags::TYPE_PUBLIC, Some(object));
    let getter = image.add_method(
        "get_Count",
        flags::METHOD_PUBLIC,
        &sig::instance_method(sig::INT, &[]),
        &[],
    );
    let property = image.add_property(widget, "Count", &sig::property(sig::INT), getter);
    let field = image.add_field("total", flags::FIELD_PUBLIC, &sig::field(sig::DOUBLE));

    let assembly = Assembly::from_bytes("Sig", image.build()).unwrap();
    let ctx = dotlens::metadata::signature::TypeNameCtx {
        resolve: &|t, r| assembly.type_name_for_token(t, r),
        type_params: &[],
        method_params: &[],
    };
    assert_eq!(
        dotlens::metadata::signature::parse_property_sig(
            assembly.property_sig_blob(property).unwrap(),
            &ctx
        )
        .unwrap(),
        "int"
    );
    assert_eq!(
        dotlens::metadata::signature::parse_field_sig(
            assembly.field_sig_blob(field).unwrap(),
            &ctx
        )
        .unwrap(),
        "double"
    );
    assert_eq!(assembly.property_accessor(property).unwrap(), Some(getter));
}

#[test]
fn load_context_roots_are_sorted_and_reference_sets_resolvable() {
    let project = TestProject::new();
    let artifact_dir = project.path().join("bin");
    std::fs::create_dir_all(&artifact_dir).unwrap();
    project.add_binary("bin/ZLib.dll", &default_app_image());
    project.add_binary("bin/ALib.dll", &default_app_image());
    project.add_binary("bin/notes.txt", b"not a dll");

    let ref_dir = project.path().join("refs");
    std::fs::create_dir_all(&ref_dir).unwrap();
    let mut runtime = ImageBuilder::new("System.Runtime");
    runtime.assembly_ref("System.Private.CoreLib");
    project.add_binary("refs/System.Runtime.dll", &runtime.build());

    let mut context = LoadContext::open(&artifact_dir, &ref_dir, None).unwrap();
    let names: Vec<&str> = context.roots().iter().map(|a| a.simple_name()).collect();
    assert_eq!(names, vec!["ALib", "ZLib"]);

    // Reference assemblies resolve through the search path but are not roots.
    assert!(context.resolve("System.Runtime").is_some());
    assert!(context.resolve("Missing.Assembly").is_none());
}

#[test]
fn unreadable_roots_are_skipped_with_a_diagnostic() {
    let project = TestProject::new();
    let artifact_dir = project.path().join("bin");
    std::fs::create_dir_all(&artifact_dir).unwrap();
    project.add_binary("bin/Good.dll", &default_app_image());
    project.add_binary("bin/Broken.dll", b"garbage bytes, not a PE image");

    let context = LoadContext::open(&artifact_dir, &artifact_dir, None).unwrap();
    assert_eq!(context.roots().len(), 1);
    assert_eq!(context.roots()[0].simple_name(), "Good");
    assert_eq!(context.diagnostics().len(), 1);
    assert!(context.diagnostics()[0].contains("Broken.dll"));
}

#[test]
fn non_assembly_bytes_are_rejected() {
    assert!(Assembly::from_bytes("bad", b"plainly not an image".to_vec()).is_err());
}
