//! 画像取得モジュール
//!
//! カメラまたはライブラリから1枚の画像を取得し、
//! ファイル名とMIMEタイプを正規化して SelectedImage を作る。

mod picker;

pub use picker::{scan_library, DesktopPicker};

use crate::error::{DentiCheckError, Result};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// 画像の取得元
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    Camera,
    Library,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageSource::Camera => write!(f, "カメラ"),
            ImageSource::Library => write!(f, "ギャラリー"),
        }
    }
}

/// 選択された画像（取得のたびに丸ごと置き換える）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedImage {
    pub location: PathBuf,
    pub file_name: String,
    pub mime_type: String,
}

/// ピッカーが返す生のアセット
#[derive(Debug, Clone, Default)]
pub struct PickedAsset {
    pub location: Option<PathBuf>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

impl PickedAsset {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string());
        Self {
            location: Some(path),
            file_name,
            mime_type: None,
        }
    }
}

/// 画像ピッカー（カメラ・ライブラリ）
#[allow(async_fn_in_trait)]
pub trait Picker {
    /// 取得元の権限を要求する
    async fn request_permission(&self, source: ImageSource) -> bool;

    /// 画像を1枚選ぶ。ユーザーがキャンセルした場合は `Ok(None)`
    async fn pick(&self, source: ImageSource) -> Result<Option<PickedAsset>>;
}

/// 権限確認 → 選択 → 正規化
///
/// 権限拒否・キャンセル時は何も変更せずエラーを返す。
pub async fn acquire<P: Picker>(picker: &P, source: ImageSource) -> Result<SelectedImage> {
    if !picker.request_permission(source).await {
        info!(%source, "permission denied");
        return Err(DentiCheckError::PermissionDenied(source));
    }

    let Some(asset) = picker.pick(source).await? else {
        debug!(%source, "picker cancelled");
        return Err(DentiCheckError::Cancelled);
    };

    let image = normalize_asset(asset, chrono::Utc::now().timestamp_millis())?;
    info!(file_name = %image.file_name, mime_type = %image.mime_type, "image selected");
    Ok(image)
}

/// ファイル名・MIMEタイプを補完して SelectedImage にする
pub fn normalize_asset(asset: PickedAsset, now_millis: i64) -> Result<SelectedImage> {
    let location = asset
        .location
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| DentiCheckError::ImageLoad("画像の場所が取得できません".into()))?;

    let file_name = asset
        .file_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| default_file_name(asset.mime_type.as_deref(), now_millis));

    let mime_type = match asset.mime_type.filter(|m| !m.trim().is_empty()) {
        Some(mime) => mime,
        None => mime_from_extension(&file_name)
            .or_else(|| sniff_mime_type(&location))
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string(),
    };

    Ok(SelectedImage {
        location,
        file_name,
        mime_type,
    })
}

/// `ai-check-<ミリ秒>.<拡張子>`（拡張子はMIMEのサブタイプ、なければ jpg）
pub fn default_file_name(mime_type: Option<&str>, now_millis: i64) -> String {
    let ext = mime_type
        .and_then(|m| m.split('/').nth(1))
        .filter(|sub| !sub.is_empty())
        .unwrap_or("jpg");
    format!("ai-check-{}.{}", now_millis, ext)
}

/// 拡張子からMIMEタイプを推定
pub fn mime_from_extension(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name).extension()?.to_string_lossy().to_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}

/// 先頭バイトから画像形式を判定
fn sniff_mime_type(path: &Path) -> Option<&'static str> {
    let mut header = [0u8; 32];
    let mut file = std::fs::File::open(path).ok()?;
    let n = file.read(&mut header).ok()?;
    let format = image::guess_format(&header[..n]).ok()?;
    match format {
        image::ImageFormat::Png => Some("image/png"),
        image::ImageFormat::WebP => Some("image/webp"),
        image::ImageFormat::Jpeg => Some("image/jpeg"),
        _ => None,
    }
}
