use crate::analysis::{Analyzer, RunRecord, StateResult};
use crate::config::Config;
use crate::engine::SemiMarkovEngine;
use crate::model::FrequencyReport;
use anyhow::{Context, Result, bail};
use glob::glob;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Simulation directory manager.
///
/// A simulation directory holds `config.toml`, a checkpoint of the engine,
/// one report per run and the analysis results.
pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    /// Write the default configuration into `sim_dir`.
    pub fn init_sim<P: AsRef<Path>>(sim_dir: P) -> Result<()> {
        let sim_dir = sim_dir.as_ref();
        fs::create_dir_all(sim_dir).with_context(|| format!("failed to create {sim_dir:?}"))?;

        let config_file = sim_dir.join("config.toml");
        if config_file.exists() {
            bail!("{config_file:?} already exists");
        }
        Config::default()
            .to_file(&config_file)
            .context("failed to write default config")?;
        log::info!("created {config_file:?}");

        Ok(())
    }

    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    /// Ordered state names of the configured model.
    pub fn states(&self) -> Vec<String> {
        self.cfg.model.transitions.keys().cloned().collect()
    }

    /// Start a new run from a fresh engine, discarding any previous checkpoint.
    pub fn create_run(&self, steps: Option<u64>) -> Result<FrequencyReport> {
        let engine = self
            .cfg
            .build_engine()
            .context("failed to construct engine")?;
        self.run_simulation(engine, steps)
    }

    /// Continue the run stored in the checkpoint.
    pub fn resume_run(&self, steps: Option<u64>) -> Result<FrequencyReport> {
        let checkpoint_file = self.checkpoint_file();
        let engine = SemiMarkovEngine::load_checkpoint(&checkpoint_file)
            .with_context(|| format!("failed to load {checkpoint_file:?}"))?;
        let expected = self
            .cfg
            .build_engine()
            .context("failed to construct engine")?;
        if engine.chain() != expected.chain() {
            bail!("checkpoint model differs from the current config");
        }
        log::info!("loaded {checkpoint_file:?}");
        self.run_simulation(engine, steps)
    }

    /// First `n_ticks` states of a fresh engine.
    pub fn trace(&self, n_ticks: usize) -> Result<Vec<String>> {
        let mut engine = self
            .cfg
            .build_engine()
            .context("failed to construct engine")?;
        Ok(engine.ticks().take(n_ticks).collect())
    }

    /// Compare every report with the analytic steady state.
    pub fn analyze_sim(&self) -> Result<Vec<StateResult>> {
        let engine = self
            .cfg
            .build_engine()
            .context("failed to construct engine")?;
        let mut analyzer = Analyzer::new(engine.chain()).context("failed to construct analyzer")?;

        let n_reports = self.count_report_files().context("failed to count reports")?;
        if n_reports == 0 {
            bail!("no reports found in {:?}", self.sim_dir);
        }
        for report_idx in 0..n_reports {
            let report_file = self.report_file(report_idx);
            analyzer
                .add_file(&report_file)
                .with_context(|| format!("failed to add {report_file:?}"))?;
        }

        let analysis_file = self.analysis_file();
        analyzer
            .save_results(&analysis_file)
            .context("failed to save results")?;
        log::info!("saved {analysis_file:?}");

        Ok(analyzer.results())
    }

    /// Remove every file written by runs and analyses.
    pub fn clean_sim(&self) -> Result<()> {
        let mut files = self.report_files().context("failed to list reports")?;
        files.push(self.checkpoint_file());
        files.push(self.analysis_file());
        for file in files.into_iter().filter(|file| file.exists()) {
            fs::remove_file(&file).with_context(|| format!("failed to remove {file:?}"))?;
            log::info!("removed {file:?}");
        }
        Ok(())
    }

    fn run_simulation(
        &self,
        mut engine: SemiMarkovEngine,
        steps: Option<u64>,
    ) -> Result<FrequencyReport> {
        let steps = steps.unwrap_or(self.cfg.output.steps);
        log::info!(
            "running {steps} ticks from {:?} ({} ticks left)",
            engine.current_state(),
            engine.remaining_holding_time()
        );

        let report = engine.run(steps);

        let report_idx = self.count_report_files().context("failed to count reports")?;
        let report_file = self.report_file(report_idx);
        let record = RunRecord {
            chain: engine.chain().clone(),
            report,
        };
        record.save(&report_file).context("failed to save report")?;
        log::info!("saved {report_file:?}");

        engine
            .save_checkpoint(self.checkpoint_file())
            .context("failed to save checkpoint")?;

        Ok(record.report)
    }

    fn report_files(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.sim_dir.join("report-*.msgpack");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let files = glob(pattern)
            .context("failed to glob reports")?
            .filter_map(Result::ok)
            .collect();
        Ok(files)
    }

    fn count_report_files(&self) -> Result<usize> {
        Ok(self.report_files()?.len())
    }

    fn report_file(&self, report_idx: usize) -> PathBuf {
        self.sim_dir.join(format!("report-{report_idx:04}.msgpack"))
    }

    fn checkpoint_file(&self) -> PathBuf {
        self.sim_dir.join("checkpoint.msgpack")
    }

    fn analysis_file(&self) -> PathBuf {
        self.sim_dir.join("analysis.msgpack")
    }
}
