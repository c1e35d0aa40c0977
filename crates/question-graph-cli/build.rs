//! Makes the libtorch runtime used by the embedding model loadable next to the
//! binary on macOS. torch-sys unpacks libtorch under its own build directory;
//! the newest copy is mirrored into `target/<profile>/libtorch` and the binary
//! gets an rpath pointing there.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const MARKER: &str = "libtorch_cpu.dylib";

fn newest_libtorch(build_dir: &Path) -> Option<PathBuf> {
    fs::read_dir(build_dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("torch-sys-"))
        })
        .map(|p| p.join("out/libtorch/libtorch/lib"))
        .filter_map(|lib| {
            let modified = fs::metadata(lib.join(MARKER)).and_then(|m| m.modified()).ok()?;
            Some((modified, lib))
        })
        .max_by_key(|(modified, _): &(SystemTime, PathBuf)| *modified)
        .map(|(_, lib)| lib)
}

fn mirror_dylibs(from: &Path, to: &Path) {
    let Ok(entries) = fs::read_dir(from) else {
        return;
    };
    if fs::create_dir_all(to).is_err() {
        return;
    }
    for src in entries.flatten().map(|e| e.path()) {
        if src.extension().and_then(|s| s.to_str()) != Some("dylib") {
            continue;
        }
        if let Some(name) = src.file_name() {
            let _ = fs::copy(&src, to.join(name));
        }
    }
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    let Some(out_dir) = env::var_os("OUT_DIR").map(PathBuf::from) else {
        return;
    };

    // OUT_DIR = target/<profile>/build/<crate-hash>/out
    let Some(build_dir) = out_dir.parent().and_then(Path::parent) else {
        return;
    };
    let Some(profile_dir) = build_dir.parent() else {
        return;
    };

    if let Some(lib_dir) = newest_libtorch(build_dir) {
        mirror_dylibs(&lib_dir, &profile_dir.join("libtorch"));
        println!("cargo:rustc-link-arg=-Wl,-rpath,@executable_path/libtorch");
    }
}
