use lambert_ps_lib as lps;
use lps::interop::ToImage;
use lps::{eval, io, PhotometricStereo};

use glob::glob;
use std::path::PathBuf;

// Default values for some of the program arguments.
const DEFAULT_OUT_DIR: &str = "out";
const DEFAULT_DELAY_MS: u64 = 0;
const ERROR_MAP_MAX_DEG: f32 = 45.0;

/// Entry point of the program.
fn main() {
    parse_args()
        .and_then(run)
        .unwrap_or_else(|err| eprintln!("Error: {:?}", err));
}

fn display_help() {
    eprintln!(
        r#"
lambert-ps

Lambertian photometric stereo.

USAGE:
    lambert-ps [FLAGS...] --lights lights.txt IMAGE_FILES...
    For example:
        lambert-ps --lights lights.txt --mask mask.png *.png

FLAGS:
    --help                 # Print this message and exit
    --version              # Print version and exit
    --lights file.txt      # File path for the light directions (one "x y z" per line)
    --mask file.png        # Mask image, zero pixels are background
    --gt file.psnm         # Ground truth normal map to evaluate against
    --out-dir dir/         # Output directory for the normal maps (default: {})
    --delay int            # Pause in ms after writing the rendered maps (default: {})
"#,
        DEFAULT_OUT_DIR, DEFAULT_DELAY_MS,
    )
}

#[derive(Debug)]
/// Type holding command line arguments.
struct Args {
    lights_path: String,
    mask_path: Option<String>,
    gt_path: Option<String>,
    out_dir: String,
    delay_ms: u64,
    images_paths: Vec<PathBuf>,
}

/// Function parsing the command line arguments and returning an Args object or an error.
fn parse_args() -> Result<Args, Box<dyn std::error::Error>> {
    let mut args = pico_args::Arguments::from_env();

    // Check if the --help or --version flags are present.
    if args.contains(["-h", "--help"]) {
        display_help();
        std::process::exit(0);
    } else if args.contains(["-v", "--version"]) {
        println!("{}", std::env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    // Mandatory arguments.
    let lights_path: String = args.value_from_str("--lights")?;

    // Optional arguments.
    let mask_path = args.opt_value_from_str("--mask")?;
    let gt_path = args.opt_value_from_str("--gt")?;
    let out_dir = args
        .opt_value_from_str("--out-dir")?
        .unwrap_or_else(|| DEFAULT_OUT_DIR.into());
    let delay_ms = args
        .opt_value_from_str("--delay")?
        .unwrap_or(DEFAULT_DELAY_MS);

    // Verify that images paths are correct.
    let free_args = args.free()?;
    let images_paths = absolute_file_paths(&free_args)?;

    Ok(Args {
        lights_path,
        mask_path,
        gt_path,
        out_dir,
        delay_ms,
        images_paths,
    })
}

/// Retrieve the absolute paths of all files matching the arguments.
fn absolute_file_paths(args: &[String]) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut abs_paths = Vec::new();
    for path_glob in args {
        let mut paths = paths_from_glob(path_glob)?;
        abs_paths.append(&mut paths);
    }
    abs_paths
        .iter()
        .map(|p| p.canonicalize().map_err(|e| e.into()))
        .collect()
}

/// Retrieve the paths of files matching the glob pattern.
fn paths_from_glob(p: &str) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let paths = glob(p)?;
    Ok(paths.into_iter().filter_map(|x| x.ok()).collect())
}

/// Start actual program with command line arguments successfully parsed.
fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    if args.images_paths.is_empty() {
        return Err("There is no such image. Use --help to know how to use this tool.".into());
    }

    // Get the path of output directory.
    let out_dir_path = PathBuf::from(&args.out_dir);
    std::fs::create_dir_all(&out_dir_path)?;

    let mut ps = PhotometricStereo::new();
    ps.set_lights(io::load_light_txt(&args.lights_path)?);

    // Load the dataset in memory.
    let img_count = args.images_paths.len();
    eprintln!("Loading {} images ...", img_count);
    let now = std::time::Instant::now();
    let pb = indicatif::ProgressBar::new(img_count as u64);
    let mut images = Vec::with_capacity(img_count);
    for path in &args.images_paths {
        images.push(image::open(path)?.into_luma8());
        pb.inc(1);
    }
    pb.finish();
    let (measurements, height, width) = io::measurements_from_images(&images)?;
    ps.set_measurements(measurements, height, width)?;
    if let Some(mask_path) = &args.mask_path {
        ps.load_mask(mask_path)?;
    }
    eprintln!("Loading took {:.1} s", now.elapsed().as_secs_f32());

    // Estimate the surface normals.
    let now = std::time::Instant::now();
    ps.solve()?;
    eprintln!("Solving took {:.3} s", now.elapsed().as_secs_f32());

    // Save the estimated normal map, raw and color-coded.
    ps.save_normal_map(out_dir_path.join("normals.psnm"))?;
    ps.normal_map_image()?.save(out_dir_path.join("normals.png"))?;

    // Compare against the ground truth if one was provided.
    if let Some(gt_path) = &args.gt_path {
        let (gt_normals, _, _) = io::load_normal_map(gt_path)?;
        let mean_error = ps.evaluate(&gt_normals)?;
        println!("Mean angular error: {:.3} degrees", mean_error);
        let normals = ps.normals().ok_or(lps::Error::NormalsMissing)?;
        let errors = eval::angular_error_deg(normals, &gt_normals)?;
        let map = eval::error_map(&errors, ps.height(), ps.width(), ERROR_MAP_MAX_DEG)?;
        map.to_image().save(out_dir_path.join("error.png"))?;
    }

    // Leave the rendered maps on screen for a while when asked to.
    if args.delay_ms > 0 {
        std::thread::sleep(std::time::Duration::from_millis(args.delay_ms));
    }
    Ok(())
}
