//! Shared helpers for integration tests: temp project trees and fixture
//! assembly images.

#![allow(dead_code)]

pub mod image;

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use image::{ImageBuilder, flags, param, sig};

/// A throwaway project tree rooted in a temp dir.
pub struct TestProject {
    pub dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn add_file(&self, path: &str, content: &str) -> PathBuf {
        let file_path = self.dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&file_path, content).expect("Failed to write file");
        file_path
    }

    pub fn add_binary(&self, path: &str, content: &[u8]) -> PathBuf {
        let file_path = self.dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&file_path, content).expect("Failed to write binary");
        file_path
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Write a csproj declaring `net9.0` plus a source file, returning the
/// source path.
pub fn scaffold_project(project: &TestProject) -> PathBuf {
    project.add_file(
        "App.csproj",
        r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <TargetFramework>net9.0</TargetFramework>
  </PropertyGroup>
</Project>"#,
    );
    project.add_file("src/Foo.cs", "public class Foo { }")
}

/// Build a fake SDK root with one reference pack (and no shared runtime),
/// returning its path. The pack contains a System.Runtime fixture so the
/// reference set is non-empty.
pub fn scaffold_sdk(project: &TestProject) -> PathBuf {
    let ref_dir = "sdk/packs/Microsoft.NETCore.App.Ref/9.0.4/ref/net9.0";
    let mut runtime = ImageBuilder::new("System.Runtime");
    let corelib = runtime.assembly_ref("System.Private.CoreLib");
    let object = runtime.type_ref(corelib, "System", "Object");
    runtime.begin_class("System", "Console", flags::TYPE_PUBLIC, Some(object));
    runtime.add_method(
        "WriteLine",
        flags::METHOD_PUBLIC_STATIC,
        &sig::static_method(sig::VOID, &[sig::STRING]),
        &[param("value")],
    );
    project.add_binary(&format!("{ref_dir}/System.Runtime.dll"), &runtime.build());
    project.path().join("sdk")
}

/// The default fixture app assembly:
///
/// ```csharp
/// namespace MyApp;
/// public class Foo
/// {
///     public int Bar(int x) => x;
///     public string Bar(string s) => s;
///     private void Hidden() { }
/// }
/// ```
pub fn default_app_image() -> Vec<u8> {
    let mut app = ImageBuilder::new("AppLib");
    let runtime = app.assembly_ref("System.Runtime");
    let object = app.type_ref(runtime, "System", "Object");
    app.begin_class("MyApp", "Foo", flags::TYPE_PUBLIC, Some(object));
    app.add_method(
        "Bar",
        flags::METHOD_PUBLIC,
        &sig::instance_method(sig::INT, &[sig::INT]),
        &[param("x")],
    );
    app.add_method(
        "Bar",
        flags::METHOD_PUBLIC,
        &sig::instance_method(sig::STRING, &[sig::STRING]),
        &[param("s")],
    );
    app.add_method(
        "Hidden",
        flags::METHOD_PRIVATE,
        &sig::instance_method(sig::VOID, &[]),
        &[],
    );
    app.build()
}

/// Scaffold project + SDK + compiled output in one call. Returns
/// `(source_path, sdk_root)`; the app image lands in `bin/Debug/net9.0`.
pub fn scaffold_full(project: &TestProject, app_image: &[u8]) -> (PathBuf, PathBuf) {
    let source = scaffold_project(project);
    let sdk = scaffold_sdk(project);
    project.add_binary("bin/Debug/net9.0/AppLib.dll", app_image);
    (source, sdk)
}
