use anyhow::{Context, Result};
use espa_elevation::ElevationBuilder;

use super::SceneArgs;

pub fn run(scene: SceneArgs) -> Result<()> {
    let config = scene.config()?;
    let request = scene.request()?;

    let product = ElevationBuilder::new(config)
        .generate(&request)
        .with_context(|| {
            format!(
                "Failed to build elevation band for {}",
                request.metadata.path().display()
            )
        })?;

    println!("Elevation: {}", product.image.display());
    println!("Header: {}", product.header.display());
    println!("Source: {}", product.source);
    println!(
        "Grid: {} samples x {} lines",
        product.target.samples, product.target.lines
    );
    if let Some(band) = &product.band {
        println!("Recorded band: {} ({})", band.file_name, band.production_date);
    }

    Ok(())
}
