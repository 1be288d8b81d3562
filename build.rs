// SPDX-License-Identifier: Apache-2.0 OR MIT
fn main() {
    // Same-host multicast tests are skipped under `cargo tarpaulin`, which
    // sets this cfg; declare it so regular builds don't warn about it.
    println!("cargo:rustc-check-cfg=cfg(tarpaulin)");
}
