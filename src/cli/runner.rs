use std::path::Path;

use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use safetree::core::decode::extract_dataset;
use safetree::core::layout::build_tree;
use safetree::io::{DirMapper, Mapper, decode_xml};
use safetree::products::rcm;
use safetree::{Dataset, ReaderOptions, Tree, Variable};

use super::args::{CliArgs, LayoutArg};
use super::errors::AppError;

fn reader_options(args: &CliArgs) -> Result<ReaderOptions, AppError> {
    let mut options = match &args.config {
        Some(path) => ReaderOptions::from_json_file(path)?,
        None => ReaderOptions::default(),
    };
    if let Some(value) = args.parallelism {
        if value == 0 {
            return Err(AppError::ZeroParallelism { value });
        }
        options.max_parallelism = Some(value);
    }
    Ok(options)
}

fn decode_file(input: &Path, key: &str, layout: LayoutArg, options: &ReaderOptions) -> Result<Tree, AppError> {
    let mapper = DirMapper::new(input)?;
    info!("decoding {} with the {:?} layout", key, layout);
    let doc = decode_xml(&mapper.read(key)?, &options.markers())?;
    let tree = match layout {
        LayoutArg::RcmProduct => build_tree(&doc, &rcm::product_layout(), options)?,
        LayoutArg::RcmNoise => build_tree(&doc, &rcm::noise_level_layout(), options)?,
        LayoutArg::Generic => Tree::new().insert("/", extract_dataset(&doc, None, &options.markers())?)?,
    };
    Ok(tree)
}

fn describe_variable(var: &Variable) -> Value {
    json!({
        "dims": var.dims,
        "shape": var.shape(),
        "dtype": var.data.dtype(),
        "attrs": var.attrs,
    })
}

fn describe_dataset(ds: &Dataset) -> Value {
    let section = |vars: &indexmap::IndexMap<String, Variable>| -> serde_json::Map<String, Value> {
        vars.iter().map(|(name, var)| (name.clone(), describe_variable(var))).collect()
    };
    json!({
        "attrs": ds.attrs,
        "coords": section(&ds.coords),
        "data_vars": section(&ds.data_vars),
    })
}

/// Paths to the layout of their datasets, values left out
pub fn summarize(tree: &Tree) -> Value {
    let nodes: serde_json::Map<String, Value> = tree
        .iter()
        .map(|(path, ds)| (path.to_string(), describe_dataset(ds)))
        .collect();
    Value::Object(nodes)
}

fn print_variable(name: &str, var: &Variable, kind: &str) {
    let dims: Vec<String> = var
        .sizes()
        .map(|(dim, size)| format!("{}: {}", dim, size))
        .collect();
    println!("    {} {} ({}) {}", kind, name, dims.join(", "), var.data.dtype());
    for (key, value) in &var.attrs {
        println!("        {} = {}", key, value);
    }
}

fn print_tree(tree: &Tree) {
    for (path, ds) in tree.iter() {
        println!("{}", path);
        for (key, value) in &ds.attrs {
            println!("    @{} = {}", key, value);
        }
        for (name, var) in &ds.coords {
            print_variable(name, var, "coord");
        }
        for (name, var) in &ds.data_vars {
            print_variable(name, var, "var");
        }
    }
}

fn emit(tree: &Tree, as_json: bool) -> Result<(), AppError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(&summarize(tree))?);
    } else {
        print_tree(tree);
    }
    Ok(())
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.log {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let options = reader_options(&args)?;
    let batch_mode = args.batch || args.input_dir.is_some();

    if batch_mode {
        let input_dir = args.input_dir.as_ref().ok_or(AppError::MissingArgument {
            arg: "--input-dir".to_string(),
        })?;
        info!("Starting batch inspection of directory: {:?}", input_dir);
        let report = safetree::api::read_directory(input_dir, &options, args.batch)?;
        for (path, tree) in &report.trees {
            if !args.json {
                println!("# {}", path.display());
            }
            emit(tree, args.json)?;
        }
        info!("Batch inspection complete!");
        info!("Read: {}", report.read);
        info!("Skipped: {}", report.skipped);
        info!("Errors: {}", report.errors);
        return Ok(());
    }

    let input = args.input.as_ref().ok_or(AppError::MissingArgument {
        arg: "--input".to_string(),
    })?;
    let tree = match &args.file {
        Some(key) => decode_file(input, key, args.layout, &options)?,
        None => {
            if args.layout != LayoutArg::Generic {
                warn!("--layout is ignored without --file");
            }
            safetree::api::open_product(input, options)?
        }
    };
    emit(&tree, args.json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use safetree::types::ArrayData;

    #[test]
    fn summary_lists_layout_not_values() {
        let ds = Dataset::new()
            .with_attr("mission", "RCM")
            .with_variable(
                "angles",
                Variable::new(["angles"], ArrayData::from_f64(vec![20.0, 21.0]))
                    .unwrap()
                    .with_attr("units", "deg"),
            );
        let tree = Tree::new().insert("/incidenceAngles", ds).unwrap();
        let summary = summarize(&tree);
        let node = &summary["/incidenceAngles"];
        assert_eq!(node["attrs"]["mission"], json!("RCM"));
        assert_eq!(node["data_vars"]["angles"]["shape"], json!([2]));
        assert_eq!(node["data_vars"]["angles"]["dims"], json!(["angles"]));
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        use clap::Parser;
        let args = CliArgs::parse_from(["safetree", "--input", "x", "--parallelism", "0"]);
        assert!(matches!(reader_options(&args), Err(AppError::ZeroParallelism { value: 0 })));
    }
}
