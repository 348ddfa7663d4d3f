//! Show which elevation source and tiles a scene would use.
//!
//! Run with: cargo run --example plan -- /path/to/scene.xml /path/to/elevation

use espa_elevation::{BuildRequest, ElevationBuilder, ElevationConfigBuilder, ElevationError};
use std::env;

fn main() -> Result<(), ElevationError> {
    let mut args = env::args().skip(1);
    let (xml, elevation_dir) = match (args.next(), args.next()) {
        (Some(xml), Some(dir)) => (xml, dir),
        _ => {
            eprintln!("Usage: cargo run --example plan -- /path/to/scene.xml /path/to/elevation");
            std::process::exit(1);
        }
    };

    let config = ElevationConfigBuilder::new(&elevation_dir).build()?;
    let builder = ElevationBuilder::new(config);

    let plan = match builder.plan(&BuildRequest::xml(&xml)) {
        Ok(plan) => plan,
        Err(ElevationError::Metadata { message, .. }) => {
            println!("{}: {}", xml, message);
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    println!("Scene {}", plan.scene.product_id);
    println!("{:-<50}", "");
    println!("Grid: {} x {}", plan.samples, plan.lines);
    println!("Source: {}", plan.sources.primary);
    if let Some(fallback) = plan.sources.fallback {
        println!("Fallback: {}", fallback);
    }

    println!("\nFiles:");
    for file in &plan.sources.files {
        let status = if file.present { "ok" } else { "missing" };
        println!("  {:<10} {:<8} {}", file.name, status, file.source);
    }

    Ok(())
}
