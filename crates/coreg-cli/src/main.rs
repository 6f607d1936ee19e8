use argh::FromArgs;
use std::path::PathBuf;

use coreg_affine::{
    grouping::{read_pairs_table, PairCursor},
    io::{itk::read_itk_transform, record::read_record, record::SessionPaths},
    PointAccumulator, SolverParams,
};

#[derive(FromArgs)]
/// Command line tools for affine slide coregistration transforms
struct Args {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Fit(FitArgs),
    Apply(ApplyArgs),
    Pairs(PairsArgs),
    Inspect(InspectArgs),
}

#[derive(FromArgs)]
/// Refit the transform of a saved registration record and write the ITK file
#[argh(subcommand, name = "fit")]
struct FitArgs {
    /// path to the registration record
    #[argh(option)]
    record: PathBuf,

    /// folder for the transform file, defaults to the folder of the record
    #[argh(option)]
    output: Option<PathBuf>,

    /// coefficients below this magnitude are set to zero
    #[argh(option, default = "SolverParams::default().zero_tol")]
    zero_tol: f64,
}

#[derive(FromArgs)]
/// Map points through an ITK transform file
#[argh(subcommand, name = "apply")]
struct ApplyArgs {
    /// path to the transform file
    #[argh(option)]
    transform: PathBuf,

    /// point to map, as x,y; may be repeated
    #[argh(option, from_str_fn(parse_point))]
    point: Vec<[f64; 2]>,

    /// map query points back to the reference
    #[argh(switch)]
    inverse: bool,
}

#[derive(FromArgs)]
/// List the reference/query pairs of a pairing table
#[argh(subcommand, name = "pairs")]
struct PairsArgs {
    /// path to the tab-separated pairing table
    #[argh(option)]
    table: PathBuf,

    /// show only the pair at this position, clamped to the table
    #[argh(option)]
    index: Option<isize>,
}

#[derive(FromArgs)]
/// Print every representation of an ITK transform file
#[argh(subcommand, name = "inspect")]
struct InspectArgs {
    /// path to the transform file
    #[argh(positional)]
    transform: PathBuf,
}

fn parse_point(value: &str) -> Result<[f64; 2], String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected x,y, got '{value}'"))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid coordinate '{s}': {e}"))
    };
    Ok([parse(x)?, parse(y)?])
}

fn fit(args: FitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let record = read_record(&args.record)?;
    let acc = PointAccumulator::from_record(&record)?;
    log::info!(
        "Fitting {} -> {} from {} correspondences",
        acc.reference_id(),
        acc.query_id(),
        acc.current_pairs().len()
    );

    let params = SolverParams {
        zero_tol: args.zero_tol,
    };
    let transform = acc.compute_transform_with(&params)?;

    let folder = match args.output {
        Some(folder) => folder,
        None => args
            .record
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default(),
    };
    let paths = SessionPaths::new(&folder, acc.reference_id(), acc.query_id());
    transform.to_itk(Some(&paths.transform))?;

    println!("{transform}");
    println!("Wrote {}", paths.transform.display());

    Ok(())
}

fn apply(args: ApplyArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut transform = read_itk_transform(&args.transform)?.to_affine();
    if args.inverse {
        transform = transform
            .inverse()
            .ok_or("transform is singular and cannot be inverted")?;
    }

    for (src, dst) in args
        .point
        .iter()
        .zip(transform.transform_points(&args.point)?)
    {
        println!("{},{} -> {},{}", src[0], src[1], dst[0], dst[1]);
    }

    Ok(())
}

fn print_current(cursor: &PairCursor) {
    if let Some(pair) = cursor.current() {
        println!(
            "[{}] group {}: {} ({}) -> {} ({})",
            cursor.index(),
            pair.group,
            pair.barcode_reference,
            pair.path_reference.display(),
            pair.barcode_query,
            pair.path_query.display()
        );
    }
}

fn pairs(args: PairsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut cursor = PairCursor::new(read_pairs_table(&args.table)?);
    if cursor.is_empty() {
        println!("No pairs in {}", args.table.display());
        return Ok(());
    }

    match args.index {
        Some(index) => {
            cursor.advance(index);
            print_current(&cursor);
        }
        None => {
            for _ in 0..cursor.len() {
                print_current(&cursor);
                cursor.advance(1);
            }
        }
    }

    Ok(())
}

fn inspect(args: InspectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let itk = read_itk_transform(&args.transform)?;
    let transform = itk.to_affine();

    println!("type: {}", itk.name);
    println!("list [a, b, xoff, c, d, yoff]: {:?}", transform.to_list());
    println!("matrix:");
    for row in transform.to_matrix() {
        println!("  {row:?}");
    }
    for (name, value) in transform.to_parameter_map() {
        println!("{name}: {value}");
    }
    println!("determinant: {}", transform.determinant());

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    match args.command {
        Command::Fit(args) => fit(args),
        Command::Apply(args) => apply(args),
        Command::Pairs(args) => pairs(args),
        Command::Inspect(args) => inspect(args),
    }
}
