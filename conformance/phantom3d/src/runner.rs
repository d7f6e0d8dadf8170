//! 程序运行函数.

use std::io::{self, Write};
use std::time::Instant;

use rad_berry::prelude::*;

use crate::phantom;

fn sep() {
    println!("{:=<72}", "");
}

/// 单元清单: 两个体模各跑 native / resampled / filtered 三套参数,
/// 外加一个再分割窗落在强度范围之外, 注定空区域失败的单元.
fn units() -> Vec<ExtractionUnit> {
    let native = ParameterSet {
        bin_scheme: BinScheme::FixedNumber(32),
        ..ParameterSet::default()
    };
    let resampled = ParameterSet {
        resample_spacing: Some([2.0, 2.0, 2.0]),
        interpolation: Interpolation::Linear,
        bin_scheme: BinScheme::FixedSize(8.0),
        aggregation: Aggregation::PerDirection,
        ..ParameterSet::default()
    };
    let filtered = ParameterSet {
        bin_scheme: BinScheme::FixedNumber(16),
        filters: vec![
            FilterSpec::Mean { support: 3 },
            FilterSpec::Log {
                sigma_mm: 1.5,
                cutoff: 4.0,
            },
            FilterSpec::Wavelet {
                kind: WaveletKind::Haar,
                level: 1,
                subband: [Band::Low, Band::High, Band::High],
            },
            FilterSpec::Gabor {
                sigma_mm: 2.0,
                lambda_mm: 4.0,
                gamma: 0.5,
                theta_deg: 45.0,
            },
        ],
        ..ParameterSet::default()
    };
    let doomed = ParameterSet {
        resegment_range: Some((5000.0, 6000.0)),
        ..ParameterSet::default()
    };

    let mut units = Vec::new();
    for (patient, seed) in [("phantom-a", 0), ("phantom-b", 3)] {
        let (volume, mask) = phantom::pair(seed);
        for params in [&native, &resampled, &filtered] {
            units.push(ExtractionUnit::new(
                patient,
                "scan1",
                volume.clone(),
                mask.clone(),
                params.clone(),
            ));
        }
    }
    let (volume, mask) = phantom::pair(7);
    units.push(ExtractionUnit::new(
        "phantom-c", "scan1", volume, mask, doomed,
    ));
    units
}

/// 实际运行.
pub fn run() {
    let units = units();
    println!(
        "Running phantom conformance batch: {} units on {} workers...",
        units.len(),
        default_workers()
    );

    let begin = Instant::now();
    let outcome = BatchRunner::with_default_workers()
        .run(units)
        .expect("Feature key collision, library defect");
    let elapsed = begin.elapsed();

    sep();
    let table = outcome.table();
    println!(
        "{} rows x {} feature columns",
        table.n_rows(),
        table.columns().len()
    );
    let mut buf = Vec::with_capacity(1 << 16);
    table.write_csv(&mut buf).expect("CSV formatting error");
    io::stdout()
        .lock()
        .write_all(&buf)
        .expect("Stdout writing error");

    sep();
    if outcome.failures().is_empty() {
        println!("No failed units.");
    } else {
        println!("Failed units ({}):", outcome.failures().len());
        buf.clear();
        outcome
            .describe_failures_into(&mut buf)
            .expect("Report formatting error");
        io::stdout()
            .lock()
            .write_all(&buf)
            .expect("Stdout writing error");
    }

    sep();
    println!("Total wall time: {} ms", elapsed.as_millis());
}
