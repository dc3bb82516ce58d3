//! # Voxel Stream Demo Entry Point
//!
//! This is the entry point of the demo binary. It calls into the library's `run()`
//! function, which streams a generated world around a simulated player.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release -- [config.json] [--memory]
//! ```

fn main() {
    if let Err(err) = voxel_stream::run() {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
