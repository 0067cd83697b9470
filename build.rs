fn main() {
    if !cfg!(unix) {
        panic!("{} only works on unix targets", env!("CARGO_PKG_NAME"));
    }

    let target = std::env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=DBGFRONT_BUILD_TARGET={target}");
    println!("cargo:rustc-env=DBGFRONT_BUILD_PROFILE={profile}");
    println!("cargo:rerun-if-changed=build.rs");
}
