use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "denticheck")]
#[command(about = "口腔写真AIチェック・PDFリポート取得ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 結果をJSONで出力
    #[arg(long, global = true)]
    pub json: bool,
}

/// 画像の指定方法
#[derive(Args, Debug, Clone)]
pub struct ImageArgs {
    /// 画像ファイル、または画像フォルダ（フォルダなら一覧から選択）
    #[arg(required_unless_present = "camera")]
    pub image: Option<PathBuf>,

    /// 設定済みの撮影コマンドでカメラから取得
    #[arg(long, conflicts_with = "image")]
    pub camera: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 簡易チェック（検出のみ）
    Quick {
        #[command(flatten)]
        image: ImageArgs,
    },

    /// AI解析（検出 + 解釈 + PDFリポート）
    Analyze {
        #[command(flatten)]
        image: ImageArgs,

        /// 解析後にPDFリポートを取得して開く
        #[arg(long)]
        open: bool,
    },

    /// 簡易チェックとAI解析を同時に実行し、リポートを取得
    Check {
        #[command(flatten)]
        image: ImageArgs,
    },

    /// PDFリポートを取得・検証して開く
    Report {
        /// リポートURL
        #[arg(long)]
        url: String,

        /// セッションID（保存ファイル名に使用）
        #[arg(long)]
        session: Option<String>,
    },

    /// 設定
    Config {
        /// 解析サーバーのベースURLを設定
        #[arg(long)]
        set_base_url: Option<String>,

        /// アクセストークンを設定
        #[arg(long)]
        set_token: Option<String>,

        /// 現在の設定を表示
        #[arg(long)]
        show: bool,
    },

    /// コミュニティフィード
    Feed {
        /// いいねした投稿のみ
        #[arg(long, conflicts_with = "mine")]
        liked: bool,

        /// 自分の投稿のみ
        #[arg(long)]
        mine: bool,

        /// 取得開始位置
        #[arg(long, default_value = "0")]
        offset: u32,

        /// 指定した投稿のいいねを切り替える
        #[arg(long)]
        like: Option<String>,
    },
}
