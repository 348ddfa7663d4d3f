use anyhow::{Context, Result};
use espa_elevation::ElevationBuilder;

use super::SceneArgs;

pub fn run(scene: SceneArgs, json: bool) -> Result<()> {
    let config = scene.config()?;
    let request = scene.request()?;

    let plan = ElevationBuilder::new(config)
        .plan(&request)
        .context("Failed to plan elevation band")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let scene = &plan.scene;
    println!("Scene: {} ({:?})", scene.product_id, scene.schema);
    println!("Reference band: {} ({})", scene.reference.name, scene.reference.path.display());
    println!("Output: {}", plan.output.display());
    println!();
    println!(
        "Extent: x {} .. {}, y {} .. {} ({:?})",
        plan.extent.min_x, plan.extent.max_x, plan.extent.min_y, plan.extent.max_y, plan.extent.origin
    );
    println!(
        "Warp extent: {} {} {} {}",
        plan.te[0], plan.te[1], plan.te[2], plan.te[3]
    );
    println!(
        "Grid: {} samples x {} lines at {} x {}",
        plan.samples, plan.lines, plan.extent.pixel.dx, plan.extent.pixel.dy
    );
    println!();

    let sources = &plan.sources;
    let bounds = &sources.bounds;
    println!(
        "Padded bounds: N {} S {} E {} W {}{}",
        bounds.north,
        bounds.south,
        bounds.east,
        bounds.west,
        if sources.crosses_antimeridian {
            " (crosses antimeridian)"
        } else {
            ""
        }
    );
    match sources.fallback {
        Some(fallback) => println!("Source: {} (fallback {})", sources.primary, fallback),
        None => println!("Source: {}", sources.primary),
    }
    for file in &sources.files {
        println!(
            "  [{}] {:<8} {}",
            if file.present { "x" } else { " " },
            file.source,
            file.path.display()
        );
    }

    let missing = sources.missing_primary().count();
    if missing > 0 {
        println!();
        println!("{} {} file(s) missing", missing, sources.primary);
    }

    Ok(())
}
