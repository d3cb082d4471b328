//! グラフェン層数分類ツール

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use graphene_layers_lib::commands::{self, parse_point};
use graphene_layers_lib::logging;
use graphene_layers_lib::model::AppConfig;

const USAGE: &str = "\
Usage:
  graphene_layers collect <image> <layer_count> <x,y>... [--out <csv>]
  graphene_layers train <version> [<csv>...]
  graphene_layers predict <version> <image> <x,y>...
  graphene_layers models
  graphene_layers config";

fn main() {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<()> {
    let mut config = AppConfig::load_or_default();

    let Some((command, rest)) = args.split_first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    let output = match command.as_str() {
        "collect" => {
            let (image, layer, rest) = match rest {
                [image, layer, rest @ ..] => (PathBuf::from(image), layer, rest),
                _ => bail!("collect needs an image and a layer count\n{}", USAGE),
            };
            let layer_count = layer
                .parse()
                .with_context(|| format!("'{}' is not a layer count", layer))?;

            let mut out = None;
            let mut points = Vec::new();
            let mut iter = rest.iter();
            while let Some(arg) = iter.next() {
                if arg == "--out" {
                    let path = iter.next().context("--out needs a path")?;
                    out = Some(PathBuf::from(path));
                } else {
                    points.push(parse_point(arg)?);
                }
            }

            let message = commands::collect(&config, &image, layer_count, &points, out)?;
            config.update_last_image_path(&image);
            message
        }
        "train" => {
            let Some((version, sources)) = rest.split_first() else {
                bail!("train needs a version name\n{}", USAGE);
            };
            let sources: Vec<PathBuf> = sources.iter().map(PathBuf::from).collect();
            let message = commands::train(&config, &sources, version)?;
            config.update_last_model_version(version);
            message
        }
        "predict" => {
            let (version, image, points) = match rest {
                [version, image, points @ ..] => (version, PathBuf::from(image), points),
                _ => bail!("predict needs a version and an image\n{}", USAGE),
            };
            let points = points
                .iter()
                .map(|p| parse_point(p))
                .collect::<Result<Vec<_>>>()?;

            let message = commands::predict(&config, version, &image, &points)?;
            config.update_last_image_path(&image);
            config.update_last_model_version(version);
            message
        }
        "models" => commands::list_models(&config)?,
        "config" => config.summary(),
        other => bail!("unknown command '{}'\n{}", other, USAGE),
    };

    println!("{}", output);

    if let Err(e) = config.save_default() {
        tracing::warn!("Could not save config: {:#}", e);
    }
    Ok(())
}
