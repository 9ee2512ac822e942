//! The shared per-target probe sequence.
//!
//! Both back-ends hand a fresh page to [`witness_page`], which runs the same
//! sequence: enable domains, inject headers, attach DevTools listeners,
//! navigate, collect cookies/title/HTML, fingerprint, screenshot. The
//! listeners feed the event assembler concurrently with these steps; every
//! browser interaction for the target shares one deadline.

use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::{
    Cookie as CdpCookie, EnableParams as NetworkEnableParams, EventLoadingFailed,
    EventRequestWillBeSent, EventResponseReceived, GetResponseBodyParams, Headers,
    SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EnableParams as RuntimeEnableParams, EventConsoleApiCalled,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::StreamExt;
use log::{debug, error, warn};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use crate::config::{parse_header_line, Options};
use crate::drivers::assembler::{EventAssembler, RequestEvent, ResponseEvent, SecurityInfo};
use crate::drivers::{screenshot, DriverError};
use crate::fingerprint::Fingerprinter;
use crate::models::{Cookie, Observation};
use crate::utils::float_to_datetime;

/// Aborts the event-listener tasks when the witness ends, on every exit
/// path. Body-fetch tasks spawned by the response listener are not tracked;
/// they are best effort and die with the page.
struct ListenerGuard {
    handles: Vec<JoinHandle<()>>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Runs the full probe sequence against an already-created page and returns
/// the assembled observation.
pub(crate) async fn witness_page(
    page: Page,
    target: &str,
    options: &Options,
    fingerprinter: &Fingerprinter,
) -> Result<Observation, DriverError> {
    let deadline = Instant::now() + Duration::from_secs(options.scan.timeout_seconds);
    let assembler = Arc::new(EventAssembler::new(target));
    let log_scan_errors = options.logging.log_scan_errors;

    // The listeners must be live before navigation so the first request is
    // never missed.
    let _guard = attach_listeners(&page, &assembler, options).await?;

    cdp_step(deadline, page.execute(NetworkEnableParams::default()))
        .await
        .map_err(|e| DriverError::Cdp(format!("error enabling network tracking: {e}")))?;
    cdp_step(deadline, page.execute(RuntimeEnableParams::default()))
        .await
        .map_err(|e| DriverError::Cdp(format!("error enabling runtime events: {e}")))?;

    if !options.chrome.extra_headers.is_empty() {
        let mut headers = serde_json::Map::new();
        for line in &options.chrome.extra_headers {
            match parse_header_line(line) {
                Some((name, value)) => {
                    headers.insert(name, serde_json::Value::String(value));
                }
                None => warn!("custom header did not parse correctly: {line}"),
            }
        }
        if !headers.is_empty() {
            cdp_step(
                deadline,
                page.execute(SetExtraHttpHeadersParams::new(Headers::new(
                    serde_json::Value::Object(headers),
                ))),
            )
            .await
            .map_err(|e| DriverError::Cdp(format!("could not set extra http headers: {e}")))?;
        }
    }

    cdp_step(
        deadline,
        page.execute(SetUserAgentOverrideParams::new(
            options.chrome.user_agent.clone(),
        )),
    )
    .await
    .map_err(|e| DriverError::Cdp(format!("unable to set user-agent string: {e}")))?;

    // Navigate. Deadline expiry is tolerated: partial data is still useful,
    // and later steps will fail softly on their own. Other navigation errors
    // mark the observation failed but the target still returns whatever was
    // assembled.
    match timeout_at(deadline, page.goto(target)).await {
        Ok(Ok(_)) => {}
        Ok(Err(CdpError::Timeout)) | Err(_) => {
            debug!("navigation deadline expired for {target}, keeping partial data");
        }
        Ok(Err(e)) => {
            if log_scan_errors {
                error!("could not navigate to {target}: {e}");
            }
            assembler.mark_failed(e.to_string());
        }
    }

    if options.scan.delay_seconds > 0 {
        tokio::time::sleep(Duration::from_secs(options.scan.delay_seconds)).await;
    }

    if !options.scan.javascript.is_empty() {
        match timeout_at(deadline, page.evaluate(options.scan.javascript.as_str())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("failed to evaluate user-provided javascript on {target}: {e}"),
            Err(_) => warn!("user-provided javascript timed out on {target}"),
        }
    }

    match timeout_at(deadline, page.get_cookies()).await {
        Ok(Ok(cookies)) => {
            assembler.set_cookies(cookies.into_iter().map(convert_cookie).collect());
        }
        Ok(Err(e)) => {
            if log_scan_errors {
                error!("could not get cookies for {target}: {e}");
            }
        }
        Err(_) => {
            if log_scan_errors {
                error!("could not get cookies for {target}: deadline exceeded");
            }
        }
    }

    match timeout_at(deadline, page.get_title()).await {
        Ok(Ok(title)) => assembler.set_title(title.unwrap_or_default()),
        Ok(Err(e)) => {
            if log_scan_errors {
                error!("could not get page title for {target}: {e}");
            }
        }
        Err(_) => {
            if log_scan_errors {
                error!("could not get page title for {target}: deadline exceeded");
            }
        }
    }

    if !options.scan.skip_html {
        match timeout_at(deadline, page.content()).await {
            Ok(Ok(html)) => assembler.set_html(html),
            Ok(Err(e)) => {
                if log_scan_errors {
                    error!("could not get page html for {target}: {e}");
                }
            }
            Err(_) => {
                if log_scan_errors {
                    error!("could not get page html for {target}: deadline exceeded");
                }
            }
        }
    }

    let (header_map, html) = assembler.fingerprint_inputs();
    assembler.add_technologies(fingerprinter.fingerprint(&header_map, &html));

    screenshot::capture(&page, &assembler, options, target, deadline).await?;

    Ok(assembler.finish())
}

async fn cdp_step<T>(
    deadline: Instant,
    fut: impl std::future::Future<Output = Result<T, CdpError>>,
) -> Result<T, String> {
    match timeout_at(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("deadline exceeded".to_string()),
    }
}

/// Subscribes to the DevTools events the assembler consumes and spawns one
/// forwarding task per stream.
async fn attach_listeners(
    page: &Page,
    assembler: &Arc<EventAssembler>,
    options: &Options,
) -> Result<ListenerGuard, DriverError> {
    let mut handles = Vec::with_capacity(5);
    let save_content = options.scan.save_content;
    let log_scan_errors = options.logging.log_scan_errors;

    // Auto-accept JavaScript dialogs so blocking modals cannot stall
    // navigation.
    let mut dialogs = page
        .event_listener::<EventJavascriptDialogOpening>()
        .await
        .map_err(|e| DriverError::Cdp(e.to_string()))?;
    let dialog_page = page.clone();
    handles.push(tokio::spawn(async move {
        while dialogs.next().await.is_some() {
            if let Err(e) = dialog_page
                .execute(HandleJavaScriptDialogParams::new(true))
                .await
            {
                error!("failed to handle a javascript dialog: {e}");
            }
        }
    }));

    let mut console = page
        .event_listener::<EventConsoleApiCalled>()
        .await
        .map_err(|e| DriverError::Cdp(e.to_string()))?;
    let console_assembler = Arc::clone(assembler);
    handles.push(tokio::spawn(async move {
        while let Some(event) = console.next().await {
            let value: String = event
                .args
                .iter()
                .filter_map(|arg| arg.value.as_ref())
                .map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            console_assembler.on_console(console_kind(&event.r#type), &value);
        }
    }));

    let mut requests = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(|e| DriverError::Cdp(e.to_string()))?;
    let request_assembler = Arc::clone(assembler);
    handles.push(tokio::spawn(async move {
        while let Some(event) = requests.next().await {
            request_assembler.on_request(RequestEvent {
                request_id: event.request_id.inner().to_string(),
                url: event.request.url.clone(),
                wall_time: *event.wall_time.inner(),
            });
        }
    }));

    let mut responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(|e| DriverError::Cdp(e.to_string()))?;
    let response_assembler = Arc::clone(assembler);
    let response_page = page.clone();
    handles.push(tokio::spawn(async move {
        while let Some(event) = responses.next().await {
            let Some(index) = response_assembler.on_response(convert_response(&event)) else {
                continue;
            };
            if save_content {
                // Best effort: the fetch may be cut short by target
                // teardown, leaving the body truncated or missing.
                let page = response_page.clone();
                let assembler = Arc::clone(&response_assembler);
                let request_id = event.request_id.clone();
                let url = event.response.url.clone();
                tokio::spawn(async move {
                    match page.execute(GetResponseBodyParams::new(request_id)).await {
                        Ok(body) => {
                            let bytes = if body.base64_encoded {
                                STANDARD.decode(body.body.as_bytes()).unwrap_or_default()
                            } else {
                                body.body.clone().into_bytes()
                            };
                            assembler.set_body(index, bytes);
                        }
                        Err(e) => {
                            if log_scan_errors {
                                error!("could not get network request response body for {url}: {e}");
                            }
                        }
                    }
                });
            }
        }
    }));

    let mut failures = page
        .event_listener::<EventLoadingFailed>()
        .await
        .map_err(|e| DriverError::Cdp(e.to_string()))?;
    let failure_assembler = Arc::clone(assembler);
    handles.push(tokio::spawn(async move {
        while let Some(event) = failures.next().await {
            failure_assembler.on_loading_failed(event.request_id.inner(), &event.error_text);
        }
    }));

    Ok(ListenerGuard { handles })
}

fn console_kind(kind: &ConsoleApiCalledType) -> &'static str {
    match kind {
        ConsoleApiCalledType::Log => "log",
        ConsoleApiCalledType::Debug => "debug",
        ConsoleApiCalledType::Info => "info",
        ConsoleApiCalledType::Error => "error",
        ConsoleApiCalledType::Warning => "warning",
        ConsoleApiCalledType::Trace => "trace",
        ConsoleApiCalledType::Dir => "dir",
        ConsoleApiCalledType::Table => "table",
        ConsoleApiCalledType::Assert => "assert",
        _ => "other",
    }
}

fn convert_response(event: &EventResponseReceived) -> ResponseEvent {
    let response = &event.response;

    let headers = response
        .headers
        .inner()
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(key, value)| {
                    let value = match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (key.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default();

    let security = response.security_details.as_ref().map(|sec| SecurityInfo {
        protocol: sec.protocol.clone(),
        key_exchange: sec.key_exchange.clone(),
        cipher: sec.cipher.clone(),
        subject_name: sec.subject_name.clone(),
        san_list: sec.san_list.clone(),
        issuer: sec.issuer.clone(),
        valid_from: Some(*sec.valid_from.inner()),
        valid_to: Some(*sec.valid_to.inner()),
        server_signature_algorithm: sec.server_signature_algorithm,
        encrypted_client_hello: sec.encrypted_client_hello,
    });

    ResponseEvent {
        request_id: event.request_id.inner().to_string(),
        url: response.url.clone(),
        status: response.status,
        status_text: response.status_text.clone(),
        protocol: response.protocol.clone().unwrap_or_default(),
        content_length: response.encoded_data_length as i64,
        remote_ip: response.remote_ip_address.clone().unwrap_or_default(),
        mime_type: response.mime_type.clone(),
        response_time: response.response_time.as_ref().map(|t| *t.inner()),
        headers,
        security,
    }
}

fn convert_cookie(cookie: CdpCookie) -> Cookie {
    Cookie {
        name: cookie.name,
        value: cookie.value,
        domain: cookie.domain,
        path: cookie.path,
        expires: float_to_datetime(cookie.expires),
        size: cookie.size,
        http_only: cookie.http_only,
        secure: cookie.secure,
        session: cookie.session,
        priority: cookie.priority.as_ref().to_string(),
        source_scheme: cookie.source_scheme.as_ref().to_string(),
        source_port: cookie.source_port,
    }
}
