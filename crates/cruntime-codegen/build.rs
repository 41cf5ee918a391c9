//! Locates the system `libtcc` (TinyCC's embeddable code generator),
//! which backs the back-end interface this crate wraps.

fn main() {
    println!("cargo:rerun-if-env-changed=TCC_LIB_DIR");
    println!("cargo:rerun-if-env-changed=TCC_NO_PKG_CONFIG");

    if let Ok(dir) = std::env::var("TCC_LIB_DIR") {
        println!("cargo:rustc-link-search=native={dir}");
        println!("cargo:rustc-link-lib=dylib=tcc");
        return;
    }

    let skip_pkg_config = std::env::var_os("TCC_NO_PKG_CONFIG").is_some();
    if !skip_pkg_config {
        if pkg_config::Config::new().probe("libtcc").is_ok() {
            return;
        }
    }

    // No pkg-config file ships for libtcc on most distributions; fall back
    // to linking it by name and letting the platform's default search
    // paths find it, matching how libtcc is conventionally installed
    // alongside the `tcc` binary.
    println!("cargo:rustc-link-lib=dylib=tcc");
}
