//! Plans a small per-country training pipeline and prints the waves and the
//! Mermaid diagram.
//!
//! ```sh
//! RUST_LOG=debug cargo run --example pipeline --features logging
//! cargo run --example pipeline --features logging -- manifest.json
//! ```

use anyhow::Context;
use tagflow::{Blueprint, Manifest};

fn country_pipeline() -> anyhow::Result<Blueprint> {
    let mut blueprint = Blueprint::new();

    for country in ["DE", "IT"] {
        blueprint.input(&format!("X, country: {country}"))?;
        blueprint.input(&format!("y, country: {country}"))?;
    }

    blueprint
        .node()
        .name("Combine")
        .inputs(["pred, country, method", "y_test, country"])
        .output("report")
        .add()?;

    blueprint
        .node()
        .name("Predict")
        .inputs(["model, country, method", "X_test, country"])
        .output("pred, country, method")
        .add()?;

    blueprint
        .node()
        .name("Fit")
        .inputs(["X_train, country", "y_train, country", "L, country, method"])
        .output("model, country, method")
        .add()?;

    for method in ["opt", "identity"] {
        blueprint
            .node()
            .name(format!("Laplacian ({method})"))
            .input("X_train, country")
            .output(format!("L, country, method: {method}"))
            .add()?;
    }

    blueprint
        .node()
        .name("Split")
        .inputs(["X, country", "y, country"])
        .outputs([
            "X_train, country",
            "X_test, country",
            "y_train, country",
            "y_test, country",
        ])
        .add()?;

    Ok(blueprint)
}

fn main() -> anyhow::Result<()> {
    tagflow::init_logging()?;

    let blueprint = match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Couldn't read manifest {path}"))?;
            Blueprint::from_manifest(&Manifest::from_json(&json)?)?
        }
        None => country_pipeline()?,
    };

    let plan = blueprint.build()?;

    for (index, wave) in plan.levels().iter().enumerate() {
        println!("wave {index}:");

        for &id in wave {
            let (Some(node), Some(binding)) = (plan.node(id), plan.binding(id)) else {
                continue;
            };

            let outputs: Vec<&str> = binding.actual_outputs.iter().map(|v| v.as_str()).collect();
            println!("  {} -> [{}]", node.name(), outputs.join("], ["));
        }
    }

    println!();
    println!("{plan}");

    Ok(())
}
