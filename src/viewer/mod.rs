//! PDFビューアの解決
//!
//! 候補プロバイダを順に試し、最初に開けたものを採用する。
//! - アプリ指定起動ができる環境: 優先ビューア → OS既定 → フォルダ表示
//! - できない環境: OS既定（共有扱い） → フォルダ表示

use crate::error::{DentiCheckError, Result};
use serde::Serialize;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// どの経路で開いたか
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OpenedBy {
    PreferredApp(String),
    PlatformDefault,
    GenericShare,
}

impl OpenedBy {
    /// 優先ビューア以外で開いた（ユーザーに追加操作が必要な場合がある）
    pub fn is_fallback(&self) -> bool {
        !matches!(self, OpenedBy::PreferredApp(_))
    }
}

/// ビューア候補
pub trait ViewerProvider {
    fn name(&self) -> &str;

    fn outcome(&self) -> OpenedBy;

    /// 開けたら true
    fn try_open(&self, artifact: &Path) -> bool;
}

fn spawn_detached(program: &str, args: &[&str], target: &Path) -> bool {
    Command::new(program)
        .args(args)
        .arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .is_ok()
}

/// 名前指定のビューアアプリ
pub struct PreferredApp {
    program: String,
}

impl PreferredApp {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

impl ViewerProvider for PreferredApp {
    fn name(&self) -> &str {
        &self.program
    }

    fn outcome(&self) -> OpenedBy {
        OpenedBy::PreferredApp(self.program.clone())
    }

    fn try_open(&self, artifact: &Path) -> bool {
        spawn_detached(&self.program, &[], artifact)
    }
}

/// OSの既定アプリで開く（xdg-open / open / start）
pub struct SystemOpener {
    outcome: OpenedBy,
}

impl SystemOpener {
    pub fn new(outcome: OpenedBy) -> Self {
        Self { outcome }
    }
}

fn system_open(target: &Path) -> bool {
    #[cfg(windows)]
    let opened = spawn_detached("cmd", &["/c", "start", ""], target);

    #[cfg(target_os = "macos")]
    let opened = spawn_detached("open", &[], target);

    #[cfg(all(not(windows), not(target_os = "macos")))]
    let opened = spawn_detached("xdg-open", &[], target);

    opened
}

impl ViewerProvider for SystemOpener {
    fn name(&self) -> &str {
        "system"
    }

    fn outcome(&self) -> OpenedBy {
        self.outcome.clone()
    }

    fn try_open(&self, artifact: &Path) -> bool {
        system_open(artifact)
    }
}

/// 保存先フォルダを開いてユーザーに選んでもらう
pub struct RevealInFolder;

impl ViewerProvider for RevealInFolder {
    fn name(&self) -> &str {
        "folder"
    }

    fn outcome(&self) -> OpenedBy {
        OpenedBy::GenericShare
    }

    fn try_open(&self, artifact: &Path) -> bool {
        match artifact.parent() {
            Some(dir) if dir.is_dir() => system_open(dir),
            _ => false,
        }
    }
}

/// 優先順のビューアチェーン
pub struct ViewerChain {
    providers: Vec<Box<dyn ViewerProvider + Send + Sync>>,
}

impl ViewerChain {
    pub fn new(providers: Vec<Box<dyn ViewerProvider + Send + Sync>>) -> Self {
        Self { providers }
    }

    pub fn for_platform(targeted_launch: bool, preferred: &[String]) -> Self {
        let mut providers: Vec<Box<dyn ViewerProvider + Send + Sync>> = Vec::new();

        if targeted_launch {
            for program in preferred.iter().filter(|p| !p.trim().is_empty()) {
                providers.push(Box::new(PreferredApp::new(program.trim())));
            }
            providers.push(Box::new(SystemOpener::new(OpenedBy::PlatformDefault)));
        } else {
            providers.push(Box::new(SystemOpener::new(OpenedBy::GenericShare)));
        }
        providers.push(Box::new(RevealInFolder));

        Self::new(providers)
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// 先頭から試して最初に開けた経路を返す
    pub fn open(&self, artifact: &Path) -> Result<OpenedBy> {
        for provider in &self.providers {
            debug!(viewer = provider.name(), "trying viewer");
            if provider.try_open(artifact) {
                let outcome = provider.outcome();
                info!(viewer = provider.name(), fallback = outcome.is_fallback(), "report opened");
                return Ok(outcome);
            }
        }
        Err(DentiCheckError::ViewerUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeViewer {
        name: String,
        accepts: bool,
        outcome: OpenedBy,
        calls: Arc<AtomicUsize>,
    }

    impl ViewerProvider for FakeViewer {
        fn name(&self) -> &str {
            &self.name
        }

        fn outcome(&self) -> OpenedBy {
            self.outcome.clone()
        }

        fn try_open(&self, _artifact: &Path) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.accepts
        }
    }

    fn fake(name: &str, accepts: bool, outcome: OpenedBy, calls: &Arc<AtomicUsize>) -> Box<dyn ViewerProvider + Send + Sync> {
        Box::new(FakeViewer {
            name: name.to_string(),
            accepts,
            outcome,
            calls: Arc::clone(calls),
        })
    }

    #[test]
    fn test_first_accepting_provider_wins() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = ViewerChain::new(vec![
            fake("a", false, OpenedBy::PreferredApp("a".into()), &calls),
            fake("b", true, OpenedBy::PreferredApp("b".into()), &calls),
            fake("share", true, OpenedBy::GenericShare, &calls),
        ]);

        let opened = chain.open(Path::new("/tmp/r.pdf")).unwrap();
        assert_eq!(opened, OpenedBy::PreferredApp("b".into()));
        assert!(!opened.is_fallback());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_falls_back_to_share() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = ViewerChain::new(vec![
            fake("a", false, OpenedBy::PreferredApp("a".into()), &calls),
            fake("share", true, OpenedBy::GenericShare, &calls),
        ]);

        let opened = chain.open(Path::new("/tmp/r.pdf")).unwrap();
        assert_eq!(opened, OpenedBy::GenericShare);
        assert!(opened.is_fallback());
    }

    #[test]
    fn test_nothing_accepts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = ViewerChain::new(vec![fake("a", false, OpenedBy::PlatformDefault, &calls)]);
        assert!(matches!(
            chain.open(Path::new("/tmp/r.pdf")),
            Err(DentiCheckError::ViewerUnavailable)
        ));
    }

    #[test]
    fn test_for_platform_order() {
        let preferred = vec!["foxitreader".to_string(), " ".to_string(), "evince".to_string()];
        let targeted = ViewerChain::for_platform(true, &preferred);
        assert_eq!(targeted.provider_names(), vec!["foxitreader", "evince", "system", "folder"]);

        let generic = ViewerChain::for_platform(false, &preferred);
        assert_eq!(generic.provider_names(), vec!["system", "folder"]);
    }
}
