//! End-to-end tests for the CLI binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// A temporary directory holding generated packages.
struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        Self { temp_dir }
    }

    /// Writes a package with an empty-library manifest for `linux-x86_64`.
    fn package(&self, rel: &str, name: &str, declared: &[&str], manifest: &str) -> PathBuf {
        let root = self.temp_dir.path().join(rel);
        let platform_dir = root.join("platforms/linux-x86_64");
        std::fs::create_dir_all(&platform_dir).expect("failed to create platform dir");

        let mut package = format!("[package]\nname = \"{name}\"\nversion = \"1.0.0\"\n\n[dependencies]\n");
        for dep in declared {
            package.push_str(&format!("\"{dep}\" = \"1\"\n"));
        }
        std::fs::write(root.join("package.toml"), package).expect("failed to write package.toml");
        std::fs::write(platform_dir.join("manifest.toml"), manifest)
            .expect("failed to write manifest");
        root
    }

    fn nativepkg_cmd(&self) -> Command {
        let bin_path = env!("CARGO_BIN_EXE_nativepkg");
        let mut cmd = Command::new(bin_path);
        cmd.current_dir(self.temp_dir.path());
        cmd.env_remove("NATIVEPKG_PLATFORM");
        cmd.env_remove("NATIVEPKG_OS");
        cmd.env_remove("NATIVEPKG_ARCH");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.nativepkg_cmd()
            .args(args)
            .output()
            .expect("failed to run nativepkg")
    }
}

fn write_binding(root: &Path, rel: &str, content: &str) {
    let path = root.join("platforms/linux-x86_64").join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
}

#[test]
fn test_platform_honors_host_overrides() {
    let ctx = TestContext::new();
    let output = ctx
        .nativepkg_cmd()
        .arg("platform")
        .env("NATIVEPKG_OS", "darwin")
        .env("NATIVEPKG_ARCH", "arm64")
        .output()
        .expect("failed to run nativepkg");

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "macos-armv8");
}

#[test]
fn test_platform_passes_unmapped_values_through() {
    let ctx = TestContext::new();
    let output = ctx
        .nativepkg_cmd()
        .arg("platform")
        .env("NATIVEPKG_OS", "freebsd")
        .env("NATIVEPKG_ARCH", "x32")
        .output()
        .expect("failed to run nativepkg");

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "freebsd-x86");
}

#[test]
fn test_inspect_json() {
    let ctx = TestContext::new();
    let root = ctx.package(
        "png",
        "@acme/libpng-v1.6.37",
        &[],
        "libraryFiles = [\"lib/libpng16.so\"]\n\n[libraryDependencies]\nzlib = \"1.2.11\"\n",
    );

    let output = ctx.run(&[
        "--platform",
        "linux-x86_64",
        "inspect",
        root.to_str().unwrap(),
        "--json",
    ]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let doc: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("inspect --json should print JSON");
    assert_eq!(doc["name"], "@acme/libpng-v1.6.37");
    assert_eq!(doc["platform"], "linux-x86_64");
    assert_eq!(doc["manifest"]["libraryFiles"][0], "lib/libpng16.so");
    assert_eq!(doc["manifest"]["libraryDependencies"]["zlib"], "1.2.11");
}

#[test]
fn test_load_imports_requested_header() {
    let ctx = TestContext::new();
    let root = ctx.package(
        "zlib",
        "@acme/zlib-v1.2.11",
        &[],
        "[[headerFiles]]\nname = \"zlib.h\"\npath = \"headers/zlib.toml\"\n",
    );
    write_binding(
        &root,
        "headers/zlib.toml",
        "[[functions]]\nname = \"zlibVersion\"\nreturns = \"const char *\"\n\n\
         [[types]]\nname = \"z_stream\"\nkind = \"opaque\"\n",
    );

    let output = ctx.run(&[
        "--platform",
        "linux-x86_64",
        "load",
        root.to_str().unwrap(),
        "--header",
        "zlib.h",
    ]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Loaded @acme/zlib-v1.2.11 for linux-x86_64"));
    assert!(stdout.contains("zlib.h: 1 functions, 1 types"));
    assert!(stdout.contains("Unloaded @acme/zlib-v1.2.11"));
}

#[test]
fn test_load_reports_dependencies() {
    let ctx = TestContext::new();
    let root = ctx.package(
        "app",
        "app",
        &["@acme/zlib-v1.2.11"],
        "[libraryDependencies]\nzlib = \"1.2.11\"\n",
    );
    ctx.package(
        "app/packages/@acme/zlib-v1.2.11",
        "@acme/zlib-v1.2.11",
        &[],
        "",
    );

    let output = ctx.run(&["--platform", "linux-x86_64", "load", root.to_str().unwrap()]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("dep  zlib -> @acme/zlib-v1.2.11"));
}

#[test]
fn test_load_undeclared_header_fails() {
    let ctx = TestContext::new();
    let root = ctx.package("solo", "solo", &[], "");

    let output = ctx.run(&[
        "--platform",
        "linux-x86_64",
        "load",
        root.to_str().unwrap(),
        "--header",
        "missing.h",
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing.h"), "{stderr}");
}

#[test]
fn test_unsupported_platform_fails() {
    let ctx = TestContext::new();
    let root = ctx.package("png", "png", &[], "");

    let output = ctx.run(&["--platform", "plan9-mips", "load", root.to_str().unwrap()]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("plan9-mips"), "{stderr}");
}
