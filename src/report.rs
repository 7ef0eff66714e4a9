//! Xlsx export of evaluation results: one sheet of per-model accuracy, one
//! sheet of per-match outcome rows.

use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::evaluate::{ModelMetrics, OutcomeRow};

pub struct ReportSummary {
    pub models: usize,
    pub outcomes: usize,
}

pub fn export_accuracy_report(
    path: &Path,
    metrics: &[ModelMetrics],
    outcomes: &[OutcomeRow],
) -> Result<ReportSummary> {
    let mut model_rows = vec![vec![
        "Model".to_string(),
        "Decided 1X2".to_string(),
        "Hits 1X2".to_string(),
        "Acc 1X2".to_string(),
        "Decided O/U".to_string(),
        "Hits O/U".to_string(),
        "Acc O/U".to_string(),
        "Decided BTTS".to_string(),
        "Hits BTTS".to_string(),
        "Acc BTTS".to_string(),
        "Avg RMSE Goals".to_string(),
    ]];
    for m in metrics {
        model_rows.push(vec![
            m.model.as_str().to_string(),
            m.decided_1x2.to_string(),
            m.hits_1x2.to_string(),
            ratio_to_string(m.acc_1x2),
            m.decided_over25.to_string(),
            m.hits_over25.to_string(),
            ratio_to_string(m.acc_over25),
            m.decided_btts.to_string(),
            m.hits_btts.to_string(),
            ratio_to_string(m.acc_btts),
            ratio_to_string(m.avg_rmse_goals),
        ]);
    }

    let mut outcome_rows = vec![vec![
        "Match ID".to_string(),
        "Model".to_string(),
        "Pick 1X2".to_string(),
        "Hit 1X2".to_string(),
        "Pick O/U".to_string(),
        "Hit O/U".to_string(),
        "Pick BTTS".to_string(),
        "Hit BTTS".to_string(),
        "Abs Err Home".to_string(),
        "Abs Err Away".to_string(),
        "RMSE Goals".to_string(),
    ]];
    for o in outcomes {
        outcome_rows.push(vec![
            o.match_id.to_string(),
            o.model.as_str().to_string(),
            o.pick_1x2.clone().unwrap_or_default(),
            hit_to_string(o.hit_1x2),
            o.pick_over25.clone().unwrap_or_default(),
            hit_to_string(o.hit_over25),
            o.pick_btts.clone().unwrap_or_default(),
            hit_to_string(o.hit_btts),
            ratio_to_string(o.abs_err_home_goals),
            ratio_to_string(o.abs_err_away_goals),
            ratio_to_string(o.rmse_goals),
        ]);
    }

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Models")?;
        write_rows(sheet, &model_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Outcomes")?;
        write_rows(sheet, &outcome_rows)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ReportSummary {
        models: metrics.len(),
        outcomes: outcomes.len(),
    })
}

fn ratio_to_string(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.4}")).unwrap_or_default()
}

fn hit_to_string(value: Option<bool>) -> String {
    match value {
        Some(true) => "1".to_string(),
        Some(false) => "0".to_string(),
        None => String::new(),
    }
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
