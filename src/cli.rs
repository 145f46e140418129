use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "auction-vision")]
#[command(about = "ストレージオークション写真のAI査定ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// オークション写真を解析して見積もりを保存
    Analyze {
        /// オークションID
        #[arg(required = true)]
        auction_id: String,

        /// 画像URL（順番どおりに解析）
        urls: Vec<String>,

        /// 1行1URLのファイル
        #[arg(long)]
        urls_file: Option<PathBuf>,

        /// 施設名
        #[arg(long)]
        facility: Option<String>,

        /// 枠描画済み画像の保存先
        #[arg(long)]
        annotated_dir: Option<PathBuf>,

        /// キャッシュを使用（同じ画像の再分類をスキップ）
        #[arg(long)]
        use_cache: bool,
    },

    /// 保存済みの見積もりを表示
    Show {
        #[arg(required = true)]
        auction_id: String,
    },

    /// 見積もりを対話的に編集（手動上書き）
    Edit {
        #[arg(required = true)]
        auction_id: String,
    },

    /// 手動上書きを破棄してAI結果へ戻す
    Reset {
        #[arg(required = true)]
        auction_id: String,
    },

    /// 最近の見積もり一覧
    Recent {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// 見積もりをCSV/Excelに出力
    Export {
        #[arg(required = true)]
        auction_id: String,

        /// 出力形式 (csv/excel)
        #[arg(short, long, default_value = "csv")]
        format: ExportFormat,

        /// 出力ファイル/ディレクトリ
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 設定を表示/編集
    Config {
        /// APIキーを設定
        #[arg(long)]
        set_api_key: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },

    /// キャッシュ管理
    Cache {
        /// キャッシュを削除
        #[arg(long)]
        clear: bool,

        /// キャッシュ情報を表示
        #[arg(long)]
        info: bool,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Csv,
    Excel,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "xlsx",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            _ => Err(format!("Unknown format: {}. Use csv or excel", s)),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Csv => write!(f, "csv"),
            ExportFormat::Excel => write!(f, "excel"),
        }
    }
}

/// URLリストファイルの読み込み（空行と `#` 行は無視）
pub fn parse_url_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}
