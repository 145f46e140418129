use anyhow::Context;
use auction_vision::annotator::ImageAnnotator;
use auction_vision::classifier::{CacheFile, CachedClassifier, OpenAiClassifier, VisionClassifier};
use auction_vision::cli::{self, Cli, Commands};
use auction_vision::config::Config;
use auction_vision::fetcher::{HttpImageFetcher, ImageFetcher};
use auction_vision::{editor, export};
use auction_vision::{AnalysisRun, AnalysisSession, JsonResultStore, ResultStore, RunEvent, RunOutcome};
use auction_vision_common::export::ExportMeta;
use auction_vision_common::{ActiveEstimate, ConfidenceBadge};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load().context("設定ファイルを読み込めません")?;

    match cli.command {
        Commands::Analyze { auction_id, urls, urls_file, facility, annotated_dir, use_cache } => {
            println!("📸 auction-vision - 写真解析\n");

            let mut urls = urls;
            if let Some(path) = urls_file {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("URLファイルを読み込めません: {}", path.display()))?;
                urls.extend(cli::parse_url_list(&content));
            }

            let store = JsonResultStore::open(&config.store_path()?)?;
            let mut session = AnalysisSession::new(store);

            let fetcher: Arc<dyn ImageFetcher> = Arc::new(HttpImageFetcher::new(config.fetch_timeout())?);
            let openai = OpenAiClassifier::new(&config)?;
            let classifier: Arc<dyn VisionClassifier> = if use_cache {
                Arc::new(CachedClassifier::new(openai, &config.cache_dir()?))
            } else {
                Arc::new(openai)
            };
            let annotator = Arc::new(ImageAnnotator::with_font(config.font_path.as_deref()));
            if !annotator.has_font() {
                println!("⚠ ラベル用フォントが見つかりません。枠のラベルは名前なしで描画されます（config の font_path で指定）");
            }

            let run = AnalysisRun::new(&auction_id, &urls, fetcher, classifier)?
                .with_annotator(annotator)
                .with_timeouts(config.fetch_timeout(), config.classify_timeout());
            let total = run.image_count();

            session.start_tracking(&auction_id, facility.as_deref().unwrap_or(""))?;
            println!("[1/2] {}枚の画像を解析中...{}", total, if use_cache { " (キャッシュ有効)" } else { "" });

            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );

            let mut handle = run.start();
            let cancel = handle.cancel_handle();
            let pb_signal = pb.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    pb_signal.println("- キャンセル要求: 処理中の画像の後で停止します");
                    cancel.request_cancel();
                }
            });

            let mut outcome = None;
            while let Some(event) = handle.next_event().await {
                if let RunEvent::Progress { current, running_totals, items, .. } = &event {
                    pb.set_position(*current as u64);
                    pb.set_message(format!(
                        "{} items, ~${:.0} - ${:.0}",
                        items.len(),
                        running_totals.low,
                        running_totals.high
                    ));
                }
                let failed = matches!(event, RunEvent::ImageFailed { .. });

                let result = session.handle_event(event)?;
                if failed {
                    pb.println(format!("⚠ {}", session.status()));
                }
                if result.is_some() {
                    outcome = result;
                }
            }
            handle.join().await?;
            pb.finish_and_clear();

            if outcome.is_none() {
                session.abandon();
            }

            if let Some(dir) = annotated_dir {
                let written = export::write_annotated_images(&dir, &auction_id, session.summaries().list(&auction_id))?;
                println!("✔ 枠描画画像 {}件: {}", written, dir.display());
            }

            println!("[2/2] {}", session.status());
            match outcome {
                Some(RunOutcome::Saved(_)) => {
                    if let Some(active) = session.active_estimate(&auction_id)? {
                        print_estimate(&auction_id, &active);
                    }
                    println!("\n✅ 解析完了");
                }
                Some(RunOutcome::NotSaved { result, failed_images }) => {
                    println!(
                        "\n⚠ 画像 {:?} の処理に失敗したため保存していません（暫定: {}件, ${} - ${}）",
                        failed_images,
                        result.items.len(),
                        result.total_low,
                        result.total_high
                    );
                }
                Some(RunOutcome::Cancelled) => println!("\n- キャンセルしました（保存データは変更なし）"),
                None => println!("\n⚠ 解析が途中で終了しました"),
            }
        }

        Commands::Show { auction_id } => {
            let store = JsonResultStore::open(&config.store_path()?)?;
            let session = AnalysisSession::new(store);
            match session.active_estimate(&auction_id)? {
                Some(active) => print_estimate(&auction_id, &active),
                None => println!("見積もりがありません: {}", auction_id),
            }
        }

        Commands::Edit { auction_id } => {
            println!("✏ auction-vision - 見積もり編集\n");
            let store = JsonResultStore::open(&config.store_path()?)?;
            let mut session = AnalysisSession::new(store);
            match editor::run_interactive_edit(&mut session, &auction_id)? {
                Some(active) => {
                    print_estimate(&auction_id, &active);
                    println!("\n✔ 手動上書きを保存しました");
                }
                None => println!("変更は保存されていません"),
            }
        }

        Commands::Reset { auction_id } => {
            let store = JsonResultStore::open(&config.store_path()?)?;
            let mut session = AnalysisSession::new(store);
            let active = session.reset_to_ai(&auction_id)?;
            print_estimate(&auction_id, &active);
            println!("\n✔ AI結果に戻しました");
        }

        Commands::Recent { limit } => {
            let store = JsonResultStore::open(&config.store_path()?)?;
            let recent = store.list_recent(limit)?;
            if recent.is_empty() {
                println!("保存済みの見積もりはありません");
            }
            for entry in recent {
                println!(
                    "{}  {:<16} {:<24} ${:.0} - ${:.0}{}",
                    entry.updated_at.format("%Y-%m-%d %H:%M"),
                    entry.auction_id,
                    if entry.facility_name.is_empty() { "-" } else { entry.facility_name.as_str() },
                    entry.effective_low,
                    entry.effective_high,
                    if entry.is_manual { " (manual)" } else { "" }
                );
            }
        }

        Commands::Export { auction_id, format, output } => {
            println!("📄 auction-vision - エクスポート\n");
            let store = JsonResultStore::open(&config.store_path()?)?;
            let facility_name = store
                .load(&auction_id)?
                .map(|stored| stored.facility_name)
                .unwrap_or_default();
            let session = AnalysisSession::new(store);
            let active = session
                .active_estimate(&auction_id)?
                .with_context(|| format!("見積もりがありません: {}", auction_id))?;

            let meta = ExportMeta {
                auction_id: auction_id.clone(),
                facility_name,
            };
            let output = output.unwrap_or_else(|| PathBuf::from("."));
            println!("- {}を生成中...", format);
            let path = export::export_estimate(&meta, &active, format, &output)?;
            println!("✔ 出力: {}", path.display());
        }

        Commands::Config { set_api_key, show } => {
            let mut config = config;

            if let Some(key) = set_api_key {
                config.set_api_key(key)?;
                println!("✔ APIキーを設定しました");
            }

            if show {
                println!("設定:");
                println!("  モデル: {}", config.model);
                println!("  API URL: {}", config.api_url);
                println!("  temperature: {}", config.temperature);
                println!("  取得タイムアウト: {}秒", config.fetch_timeout().as_secs());
                println!("  分類タイムアウト: {}秒", config.classify_timeout().as_secs());
                println!("  保存先: {}", config.store_path()?.display());
                println!("  キャッシュ: {}", config.cache_dir()?.display());
                println!("  APIキー: {}", if config.api_key.is_some() { "設定済み" } else { "未設定" });
            }
        }

        Commands::Cache { clear, info } => {
            let dir = config.cache_dir()?;
            let cache_path = CacheFile::cache_path(&dir);

            if info || !clear {
                if cache_path.exists() {
                    let cache = CacheFile::load(&dir);
                    println!("キャッシュ情報:");
                    println!("  パス: {}", cache_path.display());
                    println!("  件数: {}", cache.len());
                    if let Ok(meta) = std::fs::metadata(&cache_path) {
                        println!("  サイズ: {} bytes", meta.len());
                    }
                } else {
                    println!("キャッシュファイルが存在しません: {}", cache_path.display());
                }
            }

            if clear {
                match CacheFile::clear(&dir) {
                    Ok(true) => println!("✔ キャッシュを削除しました: {}", cache_path.display()),
                    Ok(false) => println!("キャッシュファイルが存在しません"),
                    Err(e) => println!("キャッシュ削除エラー: {}", e),
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "auction_vision=debug,auction_vision_common=debug"
    } else {
        "auction_vision=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_estimate(auction_id: &str, active: &ActiveEstimate) {
    println!(
        "\n{} ({}): {}件",
        auction_id,
        if active.is_manual { "manual" } else { "ai" },
        active.items.len()
    );

    for (idx, item) in active.items.iter().enumerate() {
        println!(
            "  {:>2}. {} / {}  ${:.0} - ${:.0}  [{}]{}",
            idx + 1,
            item.display_name(),
            item.display_brand(),
            item.low,
            item.high,
            ConfidenceBadge::from_confidence(item.confidence).label(),
            if item.hidden { " (hidden)" } else { "" }
        );
    }

    println!("  合計: ${:.0} - ${:.0}", active.totals.low, active.totals.high);
}
