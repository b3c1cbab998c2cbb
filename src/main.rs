//! # photolab CLI
//!
//! Command-line interface for the batch image pipeline.
//!
//! ## Usage
//! ```bash
//! photolab process a.jpg b.jpg --filter sharpen --detect --out-dir out/
//! photolab process *.png --filter "gaussian_blur:kernel_size=7" --output json
//! photolab cache stats
//! ```

mod cli;

use photolab::Result;

fn main() -> Result<()> {
    cli::run()
}
