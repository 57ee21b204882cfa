//! デスクトップ向けピッカー
//!
//! - ライブラリ: ファイル指定ならそのまま、フォルダ指定なら画像一覧から対話選択
//! - カメラ: 設定された撮影コマンドを実行して保存先ファイルを受け取る

use super::{ImageSource, PickedAsset, Picker};
use crate::error::{DentiCheckError, Result};
use dialoguer::Select;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// ファイルシステム上のライブラリ + 外部撮影コマンド
#[derive(Debug, Clone)]
pub struct DesktopPicker {
    library: PathBuf,
    camera_command: Option<Vec<String>>,
    capture_dir: PathBuf,
}

impl DesktopPicker {
    pub fn new(library: impl Into<PathBuf>) -> Self {
        Self {
            library: library.into(),
            camera_command: None,
            capture_dir: std::env::temp_dir().join("denticheck-captures"),
        }
    }

    pub fn with_camera(mut self, command: Option<Vec<String>>, capture_dir: impl Into<PathBuf>) -> Self {
        self.camera_command = command.filter(|c| !c.is_empty());
        self.capture_dir = capture_dir.into();
        self
    }

    async fn pick_from_library(&self) -> Result<Option<PickedAsset>> {
        if self.library.is_file() {
            return Ok(Some(PickedAsset::from_path(&self.library)));
        }

        let images = scan_library(&self.library)?;
        if images.is_empty() {
            return Err(DentiCheckError::ImageLoad(format!(
                "画像が見つかりません: {}",
                self.library.display()
            )));
        }

        let items: Vec<String> = images
            .iter()
            .map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default())
            .collect();

        // dialoguer はブロッキングなので専用スレッドで実行
        let choice = tokio::task::spawn_blocking(move || {
            Select::new()
                .with_prompt("解析する画像を選択してください (Escでキャンセル)")
                .items(&items)
                .default(0)
                .interact_opt()
        })
        .await
        .map_err(|e| DentiCheckError::ImageLoad(e.to_string()))?
        .map_err(|e| DentiCheckError::ImageLoad(e.to_string()))?;

        Ok(choice.map(|idx| PickedAsset::from_path(&images[idx])))
    }

    async fn capture_from_camera(&self) -> Result<Option<PickedAsset>> {
        let Some((program, args)) = self.camera_command.as_ref().and_then(|c| c.split_first()) else {
            return Err(DentiCheckError::PermissionDenied(ImageSource::Camera));
        };

        tokio::fs::create_dir_all(&self.capture_dir).await?;
        let target = self
            .capture_dir
            .join(format!("capture-{}.jpg", chrono::Utc::now().timestamp_millis()));

        debug!(%program, target = %target.display(), "running capture command");
        let output = tokio::process::Command::new(program)
            .args(args)
            .arg(&target)
            .output()
            .await
            .map_err(|e| DentiCheckError::ImageLoad(format!("撮影コマンド実行エラー: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(code = ?output.status.code(), "capture command failed");
            return Err(DentiCheckError::ImageLoad(format!(
                "撮影コマンドが失敗しました (code {:?}): {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        // コマンドが何も保存しなかった場合は撮影キャンセル扱い
        if !target.exists() {
            return Ok(None);
        }

        // 撮影画像は名前を持たないものとして扱い、正規化側で命名する
        Ok(Some(PickedAsset {
            location: Some(target),
            file_name: None,
            mime_type: None,
        }))
    }
}

impl Picker for DesktopPicker {
    async fn request_permission(&self, source: ImageSource) -> bool {
        match source {
            ImageSource::Camera => self.camera_command.is_some(),
            ImageSource::Library => {
                if self.library.is_dir() {
                    std::fs::read_dir(&self.library).is_ok()
                } else {
                    std::fs::File::open(&self.library).is_ok()
                }
            }
        }
    }

    async fn pick(&self, source: ImageSource) -> Result<Option<PickedAsset>> {
        match source {
            ImageSource::Camera => self.capture_from_camera().await,
            ImageSource::Library => self.pick_from_library().await,
        }
    }
}

/// フォルダ直下の画像ファイルを名前順に列挙
pub fn scan_library(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.exists() {
        return Err(DentiCheckError::ImageLoad(format!(
            "フォルダが見つかりません: {}",
            folder.display()
        )));
    }

    let mut images: Vec<PathBuf> = WalkDir::new(folder)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && is_image_path(p))
        .collect();

    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(images)
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}
