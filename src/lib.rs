//! DentiCheck AIチェッククライアント
//!
//! 口腔写真を解析サーバーへ送り、結果の解釈とPDFリポートの取得・表示を行う。

pub mod acquisition;
pub mod cli;
pub mod client;
pub mod community;
pub mod config;
pub mod error;
pub mod report;
pub mod viewer;
pub mod workflow;
