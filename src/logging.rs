//! ログ設定
//!
//! stderr に出力するグローバルな `tracing` サブスクライバを登録する。
//! フィルタは `RUST_LOG`、未設定なら `info`。

use std::sync::OnceLock;

use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// tracing を初期化する。2回目以降は何もしない
pub fn init() {
    INITIALIZED.get_or_init(|| {
        let subscriber = Registry::default()
            .with(build_env_filter())
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr));
        // テストなどで既に設定されている場合は無視
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
