use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=BIRDCALL_VERSION");
    let version = env::var("BIRDCALL_VERSION")
        .or_else(|_| env::var("CARGO_PKG_VERSION"))
        .unwrap_or_else(|_| "dev".to_string());
    println!("cargo:rustc-env=BIRDCALL_VERSION={version}");
}
