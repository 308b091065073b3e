#[cfg(not(any(feature = "ndarray", feature = "wgpu", feature = "tch-gpu")))]
std::compile_error!("No backend selected. Enable one of the `ndarray`, `wgpu` or `tch-gpu` features.");

use anyhow::Context;
use burn::config::Config;
use pair_compare::backend::{MainAutoBackend, MainDevice};
use pair_compare::data::SyntheticPairs;
use pair_compare::model::{
    ConvNetConfig, DeepConvNetConfig, IMAGE_SIZE, MlpConfig, ResNetConfig, SiameseConfig,
};
use pair_compare::training::{ErrorStats, Evaluation, ExperimentConfig, evaluate_model};
use std::path::PathBuf;
use std::str::FromStr;

pub const HELP: &str = "\
Pair Compare

Trains a model to predict whether the first of two digit images is less than or equal to the
second one, repeats the run and reports the mean and standard deviation of the error rates.

USAGE:
    pair-compare [OPTIONS]

BEHAVIOR OVERVIEW
- The experiment configuration is loaded from --config when given, and built from defaults
  otherwise. The options below override the corresponding configuration fields.
- Each run trains a freshly initialized model and saves its best weights to
  <weights-dir>/<model-name>.pth, where the model name defaults to the model kind.

FLAGS:
    -h, --help                  Show this help message and exit
    -a, --auxiliary             Supervise intermediate layers with digit classification heads
                                (deepconvnet and siamese only)
        --no-augment            Do not extend the training set with channel-swapped pairs
        --plot                  Write the loss history next to the weights

OPTIONS:
    -m, --model <KIND>          mlp, convnet, resnet, deepconvnet or siamese [default: mlp]
    -d, --depth <N>             Depth of resnet, deepconvnet and siamese models
    -e, --epochs <N>            Number of training epochs
    -r, --runs <N>              Number of repeated runs [default: 1]
    -n, --pairs <N>             Number of generated training and test pairs
    -s, --seed <N>              Seed of the first run
    -v, --verbose <LEVEL>       0 = silent, 1 = summary, 2 = per-epoch losses
    -w, --weights-dir <PATH>    Directory of the saved weights
    -c, --config <PATH>         Load the experiment configuration from this JSON file
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelKind {
    Mlp,
    ConvNet,
    ResNet,
    DeepConvNet,
    Siamese,
}

impl ModelKind {
    fn name(self) -> &'static str {
        match self {
            ModelKind::Mlp => "mlp",
            ModelKind::ConvNet => "convnet",
            ModelKind::ResNet => "resnet",
            ModelKind::DeepConvNet => "deepconvnet",
            ModelKind::Siamese => "siamese",
        }
    }

    fn default_depth(self) -> usize {
        match self {
            ModelKind::ResNet => 10,
            _ => 30,
        }
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mlp" => Ok(ModelKind::Mlp),
            "convnet" => Ok(ModelKind::ConvNet),
            "resnet" => Ok(ModelKind::ResNet),
            "deepconvnet" => Ok(ModelKind::DeepConvNet),
            "siamese" => Ok(ModelKind::Siamese),
            other => Err(format!("unknown model kind {other:?}")),
        }
    }
}

#[derive(Debug)]
struct AppArgs {
    model: ModelKind,
    depth: Option<usize>,
    runs: usize,
    epochs: Option<usize>,
    pairs: Option<usize>,
    seed: Option<u64>,
    verbose: Option<u8>,
    weights_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    auxiliary: bool,
    no_augment: bool,
    plot: bool,
}

impl AppArgs {
    fn parse() -> Result<Self, pico_args::Error> {
        let mut pargs = pico_args::Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            println!("{}", HELP);
            std::process::exit(0);
        }

        let args = AppArgs {
            model: pargs
                .opt_value_from_str(["-m", "--model"])?
                .unwrap_or(ModelKind::Mlp),
            depth: pargs.opt_value_from_str(["-d", "--depth"])?,
            runs: pargs.opt_value_from_str(["-r", "--runs"])?.unwrap_or(1),
            epochs: pargs.opt_value_from_str(["-e", "--epochs"])?,
            pairs: pargs.opt_value_from_str(["-n", "--pairs"])?,
            seed: pargs.opt_value_from_str(["-s", "--seed"])?,
            verbose: pargs.opt_value_from_str(["-v", "--verbose"])?,
            weights_dir: pargs.opt_value_from_os_str(["-w", "--weights-dir"], parse_path)?,
            config: pargs.opt_value_from_os_str(["-c", "--config"], parse_path)?,
            // must parse flags after values
            auxiliary: pargs.contains(["-a", "--auxiliary"]),
            no_augment: pargs.contains("--no-augment"),
            plot: pargs.contains("--plot"),
        };

        let remaining = pargs.finish();
        if !remaining.is_empty() {
            return Err(pico_args::Error::ArgumentParsingFailed {
                cause: format!("unused arguments: {remaining:?}"),
            });
        }

        Ok(args)
    }

    fn experiment_config(&self) -> anyhow::Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::load(path)
                .map_err(|err| anyhow::anyhow!("{err:?}"))
                .with_context(|| format!("failed to load the configuration from {path:?}"))?,
            None => ExperimentConfig::new().with_model_name(self.model.name().into()),
        };
        if let Some(epochs) = self.epochs {
            config.nb_epochs = epochs;
        }
        if let Some(pairs) = self.pairs {
            config.n_pairs = pairs;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(verbose) = self.verbose {
            config.verbose = verbose;
        }
        if let Some(dir) = &self.weights_dir {
            config.weights_dir = dir.to_string_lossy().into_owned();
        }
        config.use_auxiliary_loss |= self.auxiliary;
        config.augment &= !self.no_augment;
        config.plot |= self.plot;
        Ok(config)
    }
}

fn parse_path(s: &std::ffi::OsStr) -> Result<PathBuf, &'static str> {
    Ok(s.into())
}

fn log_stats(split: &str, stats: &ErrorStats) {
    tracing::info!(
        "{split} error: {:.2}% +- {:.2}%",
        stats.mean * 100.0,
        stats.std * 100.0
    );
}

fn launch<B: burn::tensor::backend::AutodiffBackend + MainDevice>(
    args: &AppArgs,
) -> anyhow::Result<Evaluation> {
    let config = args.experiment_config()?;
    let device = B::main_device();
    let provider = SyntheticPairs::default();
    let depth = args.depth.unwrap_or(args.model.default_depth());
    let aux = config.use_auxiliary_loss;

    let evaluation = match args.model {
        ModelKind::Mlp => evaluate_model(
            |device: &B::Device| Ok(MlpConfig::new().init::<B>(device)),
            args.runs,
            &provider,
            &config,
            &device,
        )?,
        ModelKind::ConvNet => evaluate_model(
            |device: &B::Device| Ok(ConvNetConfig::new().init::<B>(device)),
            args.runs,
            &provider,
            &config,
            &device,
        )?,
        ModelKind::ResNet => evaluate_model(
            |device: &B::Device| {
                Ok(ResNetConfig::new(depth, 2)
                    .with_input_size(IMAGE_SIZE)
                    .init::<B>(device))
            },
            args.runs,
            &provider,
            &config,
            &device,
        )?,
        ModelKind::DeepConvNet => evaluate_model(
            |device: &B::Device| DeepConvNetConfig::new(aux).with_depth(depth).init::<B>(device),
            args.runs,
            &provider,
            &config,
            &device,
        )?,
        ModelKind::Siamese => evaluate_model(
            |device: &B::Device| SiameseConfig::new(aux).with_depth(depth).init::<B>(device),
            args.runs,
            &provider,
            &config,
            &device,
        )?,
    };
    Ok(evaluation)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pair_compare=info".parse()?),
        )
        .init();

    let args = AppArgs::parse()?;
    let evaluation = launch::<MainAutoBackend>(&args)?;

    tracing::info!(
        "{} over {} run(s):",
        args.model.name(),
        evaluation.runs.len()
    );
    log_stats("Train", &evaluation.train);
    log_stats("Validation", &evaluation.val);
    log_stats("Test", &evaluation.test);
    Ok(())
}
