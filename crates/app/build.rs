// Copyright 2025-2026 CEMAXECUTER LLC

fn main() {
    // libhackrf outside the default search path: HACKRF_LIB_DIR adds the
    // directory to the link search and embeds it as rpath so the binary finds
    // libhackrf.so at runtime without LD_LIBRARY_PATH.
    #[cfg(feature = "hackrf")]
    {
        println!("cargo:rerun-if-env-changed=HACKRF_LIB_DIR");
        if let Ok(dir) = std::env::var("HACKRF_LIB_DIR") {
            if std::path::Path::new(&dir).is_dir() {
                println!("cargo:rustc-link-search=native={}", dir);
                println!("cargo:rustc-link-arg=-Wl,-rpath,{}", dir);
            }
        }
    }
}
