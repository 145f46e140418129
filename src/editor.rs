//! 対話的な見積もり編集
//!
//! 物品ごとに low/high/非表示を入力し、手動上書きとして保存する。

use crate::error::{AuctionVisionError, Result};
use crate::session::AnalysisSession;
use crate::store::ResultStore;
use auction_vision_common::{ActiveEstimate, EditRow};
use dialoguer::{Confirm, Input};

/// 編集を保存したら新しい有効見積もりを返す。保存しなければ `None`
pub fn run_interactive_edit<S: ResultStore>(
    session: &mut AnalysisSession<S>,
    auction_id: &str,
) -> Result<Option<ActiveEstimate>> {
    let active = session
        .active_estimate(auction_id)?
        .ok_or_else(|| AuctionVisionError::NotFound(auction_id.to_string()))?;

    if active.items.is_empty() {
        println!("編集できる物品がありません");
        return Ok(None);
    }

    println!(
        "{}件の物品 ({}) Enterで現在値を維持\n",
        active.items.len(),
        if active.is_manual { "manual" } else { "ai" }
    );

    let mut rows: Vec<EditRow> = active.items.iter().map(EditRow::from).collect();
    let total = rows.len();

    for (idx, row) in rows.iter_mut().enumerate() {
        println!(
            "[{}/{}] {} / {}  (confidence {:.2})",
            idx + 1,
            total,
            display_or(&row.name, auction_vision_common::types::UNKNOWN_ITEM),
            display_or(&row.brand, auction_vision_common::types::UNKNOWN_BRAND),
            row.confidence
        );

        row.low = prompt_amount("  low", row.low)?;
        row.high = prompt_amount("  high", row.high)?;
        row.hidden = Confirm::new()
            .with_prompt("  hidden")
            .default(row.hidden)
            .interact()
            .map_err(|e| AuctionVisionError::Prompt(e.to_string()))?;
    }

    let save = Confirm::new()
        .with_prompt("手動上書きとして保存しますか？")
        .default(true)
        .interact()
        .map_err(|e| AuctionVisionError::Prompt(e.to_string()))?;

    if !save {
        return Ok(None);
    }

    session.save_edits(auction_id, &mut rows).map(Some)
}

fn prompt_amount(prompt: &str, current: f64) -> Result<f64> {
    loop {
        let input: String = Input::new()
            .with_prompt(prompt)
            .default(format_amount(current))
            .interact_text()
            .map_err(|e| AuctionVisionError::Prompt(e.to_string()))?;

        match parse_amount(&input) {
            Some(value) => return Ok(value),
            None => println!("  0以上の金額を入力してください"),
        }
    }
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

/// "$1,200" のような入力も受け付ける。負数・非数は `None`
pub fn parse_amount(input: &str) -> Option<f64> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();
    let value: f64 = cleaned.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}
