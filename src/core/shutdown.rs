//! 优雅关闭：Ctrl+C / SIGTERM 触发 CancellationToken

use tokio_util::sync::CancellationToken;

/// 安装信号处理器，返回收到关闭信号时被取消的 token
pub fn install_signal_handlers() -> CancellationToken {
    let token = CancellationToken::new();

    let on_ctrl_c = token.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
            on_ctrl_c.cancel();
        }
    });

    #[cfg(unix)]
    {
        let on_term = token.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                on_term.cancel();
            }
        });
    }

    token
}
