//! HTTP server implementation for the quill API.

use crate::api::{
    clear_history, clear_stats, get_daemon_status, get_history, get_settings, get_stats,
    history_export, reset_settings, rewrite_text, stats_export, update_settings, ApiContext,
    ApiResponse, RewriteBody,
};
use crate::server::utils::{
    read_api_port, remove_api_pid, remove_api_port, save_api_pid, save_api_port,
    take_api_server_record,
};
use quill_core::{ConfigPaths, QuillError, Result, Settings};
use std::convert::Infallible;
use std::net::{SocketAddr, TcpStream};
use tracing::{error, info, warn};
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

fn with_context(
    ctx: ApiContext,
) -> impl Filter<Extract = (ApiContext,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

/// Every API route, bound to `ctx`
pub fn routes(ctx: ApiContext) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    // Only pages served from this machine may call the API from a browser
    let origins = local_origins(ctx.port());
    let cors = warp::cors()
        .allow_origins(origins.iter().map(String::as_str))
        .allow_headers(vec!["Content-Type"])
        .allow_methods(vec!["GET", "POST", "DELETE", "PUT"]);

    let health_route = warp::path!("health")
        .and(warp::get())
        .map(|| "quill API is running");

    let get_settings_route = warp::path!("api" / "settings")
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .map(|ctx: ApiContext| warp::reply::json(&get_settings(&ctx)));

    let update_settings_route = warp::path!("api" / "settings")
        .and(warp::put())
        .and(with_context(ctx.clone()))
        .and(warp::body::json())
        .map(|ctx: ApiContext, body: Settings| warp::reply::json(&update_settings(&ctx, body)));

    let reset_settings_route = warp::path!("api" / "settings" / "reset")
        .and(warp::post())
        .and(with_context(ctx.clone()))
        .map(|ctx: ApiContext| warp::reply::json(&reset_settings(&ctx)));

    let get_history_route = warp::path!("api" / "history")
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .map(|ctx: ApiContext| warp::reply::json(&get_history(&ctx)));

    let clear_history_route = warp::path!("api" / "history")
        .and(warp::delete())
        .and(with_context(ctx.clone()))
        .map(|ctx: ApiContext| warp::reply::json(&clear_history(&ctx)));

    let export_history_route = warp::path!("api" / "history" / "export")
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .map(|ctx: ApiContext| attachment(history_export(&ctx)));

    let get_stats_route = warp::path!("api" / "stats")
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .map(|ctx: ApiContext| warp::reply::json(&get_stats(&ctx)));

    let clear_stats_route = warp::path!("api" / "stats")
        .and(warp::delete())
        .and(with_context(ctx.clone()))
        .map(|ctx: ApiContext| warp::reply::json(&clear_stats(&ctx)));

    let export_stats_route = warp::path!("api" / "stats" / "export")
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .map(|ctx: ApiContext| attachment(stats_export(&ctx)));

    let rewrite_route = warp::path!("api" / "rewrite")
        .and(warp::post())
        .and(with_context(ctx.clone()))
        .and(warp::body::json())
        .and_then(rewrite_handler);

    let daemon_status_route = warp::path!("api" / "daemon" / "status")
        .and(warp::get())
        .and(with_context(ctx))
        .map(|ctx: ApiContext| warp::reply::json(&get_daemon_status(&ctx)));

    health_route
        .or(get_settings_route)
        .or(update_settings_route)
        .or(reset_settings_route)
        .or(get_history_route)
        .or(clear_history_route)
        .or(export_history_route)
        .or(get_stats_route)
        .or(clear_stats_route)
        .or(export_stats_route)
        .or(rewrite_route)
        .or(daemon_status_route)
        .with(cors)
}

fn local_origins(port: u16) -> Vec<String> {
    vec![
        format!("http://localhost:{}", port),
        format!("http://127.0.0.1:{}", port),
    ]
}

/// The remote call blocks, so it runs off the reactor
async fn rewrite_handler(
    ctx: ApiContext,
    body: RewriteBody,
) -> std::result::Result<impl Reply, Infallible> {
    let response = tokio::task::spawn_blocking(move || rewrite_text(&ctx, body))
        .await
        .unwrap_or_else(|e| {
            error!("rewrite task failed: {}", e);
            ApiResponse::error(format!("Rewrite task failed: {}", e))
        });
    Ok(warp::reply::json(&response))
}

/// A JSON download, or an error envelope when the export failed
fn attachment(export: Result<(String, String)>) -> Response {
    match export {
        Ok((file_name, body)) => warp::reply::with_header(
            warp::reply::with_header(body, "content-type", "application/json"),
            "content-disposition",
            format!("attachment; filename=\"{}\"", file_name),
        )
        .into_response(),
        Err(e) => {
            warp::reply::json(&ApiResponse::<()>::error(format!("Export failed: {}", e)))
                .into_response()
        }
    }
}

/// Start the HTTP API server on the specified port
pub async fn start_api_server(port: u16) -> Result<()> {
    let paths = ConfigPaths::from_env();
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    // Save the port to file so we can find it later
    save_api_port(&paths, port)?;

    println!("┌─────────────────────────────────────────┐");
    println!("│          quill API Server               │");
    println!("├─────────────────────────────────────────┤");
    println!("│ Status: Running                         │");
    println!("│ Port:   {:<33} │", port);
    println!("│ URL:    http://localhost:{:<16} │", port);
    println!("└─────────────────────────────────────────┘");

    let routes = routes(ApiContext::new(paths.clone(), port));

    // Use warp's TcpListener creation to handle binding errors gracefully
    let server = warp::serve(routes).try_bind_with_graceful_shutdown(addr, async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, stopping API server");
    });

    match server {
        Ok((addr, server)) => {
            info!(%addr, "API server listening");
            save_api_pid(&paths, std::process::id())?;
            server.await;
            let _ = remove_api_port(&paths);
            let _ = remove_api_pid(&paths);
            Ok(())
        }
        Err(e) => {
            error!("failed to bind API server to port {}: {}", port, e);
            Err(QuillError::Other(format!(
                "Failed to bind to port {}: {}",
                port, e
            )))
        }
    }
}

/// Check the health of a running API server
pub fn check_api_server_health() -> Result<u16> {
    let port = read_api_port(&ConfigPaths::from_env())?;

    // Try to connect to the API server using standard TCP
    match TcpStream::connect(("127.0.0.1", port)) {
        Ok(_) => Ok(port),
        Err(e) => Err(QuillError::Other(format!(
            "Failed to connect to API server on port {}: {}",
            port, e
        ))),
    }
}

/// Stop the API server process recorded in the config directory
pub fn stop_api_server() -> Result<()> {
    let paths = ConfigPaths::from_env();
    let Some((port, pid)) = take_api_server_record(&paths) else {
        return Ok(());
    };

    let Some(pid) = pid else {
        warn!(port, "no API server PID recorded, leaving the port alone");
        return Ok(());
    };
    if pid == std::process::id() {
        return Ok(());
    }

    info!(port, pid, "stopping API server");

    #[cfg(unix)]
    {
        use std::process::Command;
        let _ = Command::new("kill").arg(pid.to_string()).status();
    }

    #[cfg(windows)]
    {
        use std::process::Command;
        let _ = Command::new("taskkill")
            .args(["/F", "/PID", &pid.to_string()])
            .status();
    }

    Ok(())
}
