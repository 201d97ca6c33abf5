use crate::model::{Chain, FrequencyReport};
use crate::stats::{Accumulator, AccumulatorReport};
use anyhow::{Context, Result, bail};
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

/// Long-run percentage of time spent in each state, in state order.
///
/// Solves the stationary distribution of the embedded jump chain and
/// weights it by the holding times.
///
/// # Errors
/// Returns an error if the stationary distribution is not unique
/// (the chain has more than one closed class).
pub fn steady_state(chain: &Chain) -> Result<Vec<f64>> {
    let pi_embed = embedded_stationary(chain).context("failed to solve embedded chain")?;

    let mut pi_true: Vec<f64> = pi_embed
        .iter()
        .enumerate()
        .map(|(i_state, &pi)| pi * chain.holding_time(i_state) as f64)
        .collect();
    let sum: f64 = pi_true.iter().sum();
    pi_true.iter_mut().for_each(|pi| *pi *= 100.0 / sum);

    Ok(pi_true)
}

fn embedded_stationary(chain: &Chain) -> Result<Vec<f64>> {
    let n = chain.n_states();

    // Balance equations (P^T - I) pi = 0 with the last one replaced by sum(pi) = 1.
    let mut mat = vec![vec![0.0; n]; n];
    for (i_row, mat_row) in mat.iter_mut().enumerate() {
        for (i_col, ele) in mat_row.iter_mut().enumerate() {
            *ele = chain.prob_row(i_col)[i_row] - if i_row == i_col { 1.0 } else { 0.0 };
        }
    }
    mat[n - 1] = vec![1.0; n];
    let mut rhs = vec![0.0; n];
    rhs[n - 1] = 1.0;

    solve(mat, rhs)
}

/// Gaussian elimination with partial pivoting.
fn solve(mut mat: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> Result<Vec<f64>> {
    let n = rhs.len();
    let tol = 1e-12;

    for i_col in 0..n {
        let i_piv = (i_col..n)
            .max_by(|&a, &b| mat[a][i_col].abs().total_cmp(&mat[b][i_col].abs()))
            .context("empty pivot range")?;
        if mat[i_piv][i_col].abs() < tol {
            bail!("system is singular (column {i_col})");
        }
        mat.swap(i_col, i_piv);
        rhs.swap(i_col, i_piv);

        let piv_row = mat[i_col].clone();
        let piv_rhs = rhs[i_col];
        for i_row in i_col + 1..n {
            let factor = mat[i_row][i_col] / piv_row[i_col];
            if factor == 0.0 {
                continue;
            }
            for (ele, &piv) in mat[i_row][i_col..].iter_mut().zip(&piv_row[i_col..]) {
                *ele -= factor * piv;
            }
            rhs[i_row] -= factor * piv_rhs;
        }
    }

    let mut sol = vec![0.0; n];
    for i_row in (0..n).rev() {
        let tail: f64 = (i_row + 1..n).map(|j| mat[i_row][j] * sol[j]).sum();
        sol[i_row] = (rhs[i_row] - tail) / mat[i_row][i_row];
    }

    Ok(sol)
}

/// Per-state comparison of simulated and analytic frequencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateResult {
    pub state: String,
    pub simulated: AccumulatorReport,
    pub expected: f64,
    pub deviation: f64,
}

/// Frequency report together with the chain that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub chain: Chain,
    pub report: FrequencyReport,
}

impl RunRecord {
    /// Write the record to a MessagePack file.
    pub fn save<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, self).context("failed to serialize record")?;
        Ok(())
    }

    /// Read a record from a MessagePack file.
    pub fn load<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        decode::from_read(&mut reader).context("failed to deserialize record")
    }
}

/// Accumulates frequency reports of one chain and compares them with its steady state.
pub struct Analyzer {
    chain: Chain,
    expected: Vec<f64>,
    acc_vec: Vec<Accumulator>,
}

impl Analyzer {
    /// Create an analyzer for `chain`, solving its steady state up front.
    pub fn new(chain: &Chain) -> Result<Self> {
        let expected = steady_state(chain).context("failed to compute steady state")?;
        let mut acc_vec = Vec::new();
        acc_vec.resize_with(chain.n_states(), Accumulator::new);
        Ok(Self {
            chain: chain.clone(),
            expected,
            acc_vec,
        })
    }

    /// Add the percentages of a run of this analyzer's chain.
    ///
    /// Records produced by any other chain are rejected.
    pub fn add_record(&mut self, record: &RunRecord) -> Result<()> {
        if record.chain != self.chain {
            bail!("record was produced by a different model than the current config");
        }
        let report = &record.report;
        if report.states != self.chain.names() {
            bail!(
                "report states {:?} differ from chain states {:?}",
                report.states,
                self.chain.names()
            );
        }
        if report.total() == 0 {
            log::warn!("skipping empty report");
            return Ok(());
        }
        for (acc, &percentage) in self.acc_vec.iter_mut().zip(&report.percentages) {
            acc.add(percentage);
        }
        Ok(())
    }

    /// Load a record file and add it.
    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let record = RunRecord::load(file)?;
        self.add_record(&record)
    }

    /// Per-state mean, standard deviation, expected value and deviation.
    pub fn results(&self) -> Vec<StateResult> {
        self.chain
            .names()
            .iter()
            .zip(&self.acc_vec)
            .zip(&self.expected)
            .map(|((state, acc), &expected)| {
                let simulated = acc.report();
                let deviation = simulated.mean - expected;
                StateResult {
                    state: state.clone(),
                    simulated,
                    expected,
                    deviation,
                }
            })
            .collect()
    }

    /// Write [`Analyzer::results`] to a MessagePack file.
    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, &self.results()).context("failed to serialize results")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SemiMarkovEngine;
    use crate::model::{HoldingTimeTable, TransitionTable};

    fn transitions(rows: &[(&str, &[(&str, f64)])]) -> TransitionTable {
        rows.iter()
            .map(|(from, row)| {
                let row = row.iter().map(|(to, w)| (to.to_string(), *w)).collect();
                (from.to_string(), row)
            })
            .collect()
    }

    fn holding(entries: &[(&str, i64)]) -> HoldingTimeTable {
        entries.iter().map(|(s, h)| (s.to_string(), *h)).collect()
    }

    fn weather() -> (TransitionTable, HoldingTimeTable) {
        (
            transitions(&[
                ("sunny", &[("sunny", 0.7), ("cloudy", 0.3), ("rainy", 0.0)]),
                ("cloudy", &[("sunny", 0.5), ("cloudy", 0.3), ("rainy", 0.2)]),
                ("rainy", &[("sunny", 0.6), ("cloudy", 0.2), ("rainy", 0.2)]),
            ]),
            holding(&[("sunny", 1), ("cloudy", 2), ("rainy", 2)]),
        )
    }

    #[test]
    fn alternating_chain_weighted_by_holding_times() {
        let trans = transitions(&[("A", &[("B", 1.0)]), ("B", &[("A", 1.0)])]);
        let chain = Chain::new(&trans, &holding(&[("A", 3), ("B", 1)])).unwrap();
        let pi = steady_state(&chain).unwrap();
        assert!((pi[0] - 75.0).abs() < 1e-9);
        assert!((pi[1] - 25.0).abs() < 1e-9);
    }

    #[test]
    fn weather_steady_state_sums_to_hundred() {
        let (trans, hold) = weather();
        let chain = Chain::new(&trans, &hold).unwrap();
        let pi = steady_state(&chain).unwrap();
        assert!((pi.iter().sum::<f64>() - 100.0).abs() < 1e-9);
        assert!(pi.iter().all(|&p| p > 0.0));
    }

    #[test]
    fn disconnected_chain_is_rejected() {
        let trans = transitions(&[("A", &[("A", 1.0)]), ("B", &[("B", 1.0)])]);
        let chain = Chain::new(&trans, &holding(&[("A", 1), ("B", 1)])).unwrap();
        assert!(steady_state(&chain).is_err());
    }

    #[test]
    fn simulation_matches_steady_state() {
        let (trans, hold) = weather();
        let mut engine = SemiMarkovEngine::with_seed(&trans, &hold, 2024).unwrap();
        let mut analyzer = Analyzer::new(engine.chain()).unwrap();
        for _ in 0..4 {
            let report = engine.run(50_000);
            let record = RunRecord {
                chain: engine.chain().clone(),
                report,
            };
            analyzer.add_record(&record).unwrap();
        }
        for result in analyzer.results() {
            assert_eq!(result.simulated.n_vals, 4);
            assert!(
                result.deviation.abs() < 2.0,
                "{}: simulated {} expected {}",
                result.state,
                result.simulated.mean,
                result.expected
            );
        }
    }

    #[test]
    fn rejects_record_of_other_model() {
        let trans = transitions(&[("A", &[("B", 1.0)]), ("B", &[("A", 1.0)])]);
        let slow = Chain::new(&trans, &holding(&[("A", 9), ("B", 1)])).unwrap();
        let fast = Chain::new(&trans, &holding(&[("A", 1), ("B", 1)])).unwrap();

        let report =
            FrequencyReport::from_counts(vec!["A".to_string(), "B".to_string()], vec![9, 1]);
        let record = RunRecord {
            chain: slow,
            report,
        };

        let mut analyzer = Analyzer::new(&fast).unwrap();
        let err = analyzer.add_record(&record).unwrap_err();
        assert!(err.to_string().contains("different model"), "{err}");
        assert_eq!(analyzer.results()[0].simulated.n_vals, 0);
    }
}
