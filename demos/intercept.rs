use gosub_net_hooks::{
    AfterHook, BeforeHook, Body, Interceptor, InterceptorConfig, InterceptError, Reply, RequestInit,
    ResponsePatch,
};
use gosub_net_hooks::events::{listener, WILDCARD};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), InterceptError> {
    env_logger::init();

    // The interceptor resolves relative URLs against the base URL and times out slow calls.
    let config = InterceptorConfig::builder()
        .base_url("https://example.com/")
        .request_timeout(Duration::from_secs(10))
        .build()
        .expect("Configuration is not valid");
    let interceptor = Interceptor::with_reqwest(config)?;

    // Answer /ping locally, never touching the network
    interceptor.before(
        BeforeHook::sync(|req| {
            if req.url.ends_with("/ping") {
                return Ok(Some(Reply::from(
                    ResponsePatch::new()
                        .status(200)
                        .header("content-type", "text/plain")
                        .text("pong"),
                )));
            }
            req.set_header("X-Intercepted", "yes");
            Ok(None)
        }),
        None,
    );

    // Tag every completed call
    interceptor.after(
        AfterHook::sync(|req, res| {
            res.headers.insert("x-hooked", "1");
            println!("after-hook: {} {} -> {}", req.method, req.url, res.status);
            Ok(())
        }),
        None,
    );

    // Stateful call, answered by the before-hook
    let xhr = interceptor.xhr();
    let probe = xhr.clone();
    xhr.add_event_listener(
        WILDCARD,
        listener(move |ev| println!("xhr event: {:<18} state={}", ev.kind, probe.ready_state())),
        None,
    );
    xhr.open("GET", "/ping")?;
    xhr.send(Body::Empty).await?;
    println!(
        "xhr: {} {} {:?} (x-hooked: {:?})",
        xhr.status(),
        xhr.status_text(),
        xhr.response_text(),
        xhr.get_response_header("x-hooked")
    );

    // Deferred call that goes out to the network
    match interceptor.fetch("/", RequestInit::new()).await {
        Ok(res) => println!(
            "fetch: {} {} ({} bytes, x-hooked: {:?})",
            res.status,
            res.status_text,
            res.body_text().map(|t| t.len()).unwrap_or(0),
            res.headers.get("x-hooked")
        ),
        Err(e) => println!("fetch failed: {}", e),
    }

    Ok(())
}
