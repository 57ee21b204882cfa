use anyhow::Context;
use clap::Parser;
use denticheck::acquisition::{DesktopPicker, ImageSource};
use denticheck::cli::{Cli, Commands, ImageArgs};
use denticheck::client::HttpBackend;
use denticheck::community::FeedClient;
use denticheck::config::Config;
use denticheck::report::ReportFetcher;
use denticheck::viewer::ViewerChain;
use denticheck::workflow::{AiCheckWorkflow, ConsoleNotifier, WorkflowSnapshot};
use denticheck_common::{interpret, FeedProjection, FeedView, FullAnalysisResult, QuickCheckResult, QuickStatus};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

type Workflow = AiCheckWorkflow<HttpBackend, ConsoleNotifier>;

fn init_tracing(verbose: bool) {
    let default = if verbose { "denticheck=debug" } else { "denticheck=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn spinner(message: &str, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} ({elapsed})") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// 未設定ならここで止める（リクエストは投げない）
fn build_workflow(config: &Config) -> anyhow::Result<Workflow> {
    let backend = HttpBackend::from_config(config)?;
    Ok(AiCheckWorkflow::new(Some(backend), ConsoleNotifier))
}

async fn select_image(workflow: &Workflow, args: &ImageArgs, config: &Config) -> bool {
    let library = args.image.clone().unwrap_or_else(|| std::path::PathBuf::from("."));
    let picker = DesktopPicker::new(library)
        .with_camera(config.camera_command.clone(), config.report_dir().join("captures"));
    let source = if args.camera { ImageSource::Camera } else { ImageSource::Library };
    workflow.select_image(&picker, source).await.is_some()
}

fn print_quick(result: &QuickCheckResult) {
    println!("\n🔍 簡易チェック結果 (セッション: {})", result.session_id);
    match result.status {
        QuickStatus::QualityFailed => println!("  画像の品質が不十分です。明るい場所で撮り直してください。"),
        QuickStatus::Error => println!("  サーバー側でエラーが発生しました。"),
        QuickStatus::Done => {}
    }
    if result.detections.is_empty() {
        println!("  検出なし");
    }
    for d in &result.detections {
        println!(
            "  - {} ({:.0}%) [x={:.0}, y={:.0}, w={:.0}, h={:.0}]",
            d.label.as_str(),
            d.confidence * 100.0,
            d.bbox.x,
            d.bbox.y,
            d.bbox.width,
            d.bbox.height
        );
    }
}

fn print_analysis(result: &FullAnalysisResult) {
    let view = interpret(result);

    println!("\n🦷 AI解析結果 (セッション: {})", result.session_id);
    println!("  リスク: {} [{}]", view.risk.label, view.risk.style);
    println!("  {}", view.summary);

    if !view.problems.is_empty() {
        println!("\n  気になるところ:");
        for (i, p) in view.problems.iter().enumerate() {
            println!("  {}. {}", i + 1, p.title);
            println!("     理由: {}", p.reason);
            println!("     対処: {}", p.action);
        }
    }

    println!("\n  やるべきこと:");
    for action in &view.actions {
        println!("  - {}", action);
    }

    println!("\n  通院の必要性: {}", view.visit.urgency.label());
    println!("  {}", view.visit.message);

    if result.rag.top_k > 0 || !result.rag.sources.is_empty() {
        println!(
            "\n  参考文献: {}件{}",
            result.rag.sources.len(),
            if result.rag.used_fallback { "（フォールバック）" } else { "" }
        );
    }
    for line in &view.disclaimer {
        println!("  ※ {}", line);
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn fetch_report(workflow: &Workflow, config: &Config) {
    let fetcher = ReportFetcher::from_config(config);
    let viewers = ViewerChain::for_platform(config.targeted_launch, &config.preferred_viewers);
    let pb = spinner("PDFリポートを取得中...", false);
    let report = workflow.download_report(&fetcher, &viewers).await;
    pb.finish_and_clear();
    if let Some(report) = report {
        println!("✔ PDFリポート: {} ({} bytes)", report.path.display(), report.byte_len);
    }
}

fn finish(snapshot: &WorkflowSnapshot, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(snapshot)?;
    }
    Ok(())
}

fn print_feed(feed: &FeedProjection) {
    if feed.is_empty() {
        match feed.view() {
            FeedView::All => println!("投稿がありません"),
            FeedView::Liked => println!("いいねした投稿がありません"),
            FeedView::Mine => println!("まだ投稿していません"),
        }
        return;
    }
    for post in feed.posts() {
        let tags: Vec<&str> = post.tags.iter().map(|t| t.name.as_str()).collect();
        println!(
            "[{}] {}{} ♥{}{} 💬{}",
            post.id,
            post.author,
            if post.is_mine { " (自分)" } else { "" },
            post.likes,
            if post.is_liked { "✔" } else { "" },
            post.comments
        );
        println!("  {}", post.content.replace('\n', "\n  "));
        if !tags.is_empty() {
            println!("  #{}", tags.join(" #"));
        }
        for image in &post.images {
            println!("  🖼 {}", image);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = Config::load().context("設定の読み込みに失敗しました")?;

    match cli.command {
        Commands::Quick { image } => {
            let workflow = build_workflow(&config)?;
            if !select_image(&workflow, &image, &config).await {
                return Ok(());
            }

            let pb = spinner("簡易チェック中...", cli.json);
            let result = workflow.run_quick().await;
            pb.finish_and_clear();

            if let (Some(result), false) = (&result, cli.json) {
                print_quick(result);
            }
            finish(&workflow.snapshot(), cli.json)?;
        }

        Commands::Analyze { image, open } => {
            let workflow = build_workflow(&config)?;
            if !select_image(&workflow, &image, &config).await {
                return Ok(());
            }

            let pb = spinner("AI解析中...", cli.json);
            let result = workflow.run_analyze().await;
            pb.finish_and_clear();

            if let (Some(result), false) = (&result, cli.json) {
                print_analysis(result);
            }
            if open && workflow.snapshot().can_download_report() {
                fetch_report(&workflow, &config).await;
            }
            finish(&workflow.snapshot(), cli.json)?;
        }

        Commands::Check { image } => {
            let workflow = build_workflow(&config)?;
            if !select_image(&workflow, &image, &config).await {
                return Ok(());
            }

            // 2つのティアは独立して並行に走る
            let pb = spinner("簡易チェック + AI解析中...", cli.json);
            let (quick, full) = tokio::join!(workflow.run_quick(), workflow.run_analyze());
            pb.finish_and_clear();

            if !cli.json {
                if let Some(quick) = &quick {
                    print_quick(quick);
                }
                if let Some(full) = &full {
                    print_analysis(full);
                }
            }
            if workflow.snapshot().can_download_report() {
                fetch_report(&workflow, &config).await;
            }
            finish(&workflow.snapshot(), cli.json)?;
        }

        Commands::Report { url, session } => {
            // URL指定の取得は解析サーバーを使わない
            let workflow: Workflow = AiCheckWorkflow::new(None, ConsoleNotifier);
            let fetcher = ReportFetcher::from_config(&config);
            let viewers = ViewerChain::for_platform(config.targeted_launch, &config.preferred_viewers);

            let pb = spinner("PDFリポートを取得中...", cli.json);
            let report = workflow
                .open_report(&fetcher, &viewers, &url, session.as_deref().unwrap_or_default())
                .await;
            pb.finish_and_clear();

            if cli.json {
                print_json(&report)?;
            }
        }

        Commands::Config { set_base_url, set_token, show } => {
            let mut config = config;

            if let Some(url) = set_base_url {
                config.set_base_url(url)?;
                println!("✔ 解析サーバーのURLを設定しました");
            }

            if let Some(token) = set_token {
                config.set_access_token(token)?;
                println!("✔ アクセストークンを設定しました");
            }

            if show {
                println!("設定:");
                println!("  ベースURL: {}", config.api_base_url().unwrap_or_else(|_| "未設定".into()));
                println!("  GraphQL: {}", config.graphql_url().unwrap_or_else(|_| "未設定".into()));
                println!("  トークン: {}", if config.access_token.is_some() { "設定済み" } else { "未設定" });
                println!("  簡易チェック期限: {}秒", config.quick_timeout_secs);
                println!("  AI解析期限: {}秒", config.analyze_timeout_secs);
                println!("  保存先: {}", config.report_dir().display());
                println!("  優先ビューア: {}", config.preferred_viewers.join(", "));
            }
        }

        Commands::Feed { liked, mine, offset, like } => {
            let client = FeedClient::from_config(&config)?;
            let view = if liked {
                FeedView::Liked
            } else if mine {
                FeedView::Mine
            } else {
                FeedView::All
            };

            let mut feed = client.fetch(view, offset).await?;
            if let Some(post_id) = like {
                let toggle = client.toggle_like(&mut feed, &post_id).await?;
                println!(
                    "✔ {} を{} (♥{})",
                    post_id,
                    if toggle.is_liked { "いいねしました" } else { "いいね解除しました" },
                    toggle.like_count
                );
            }

            if cli.json {
                print_json(&feed.posts())?;
            } else {
                print_feed(&feed);
            }
        }
    }

    Ok(())
}
