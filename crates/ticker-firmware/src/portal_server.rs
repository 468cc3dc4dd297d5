//! Configuration portal HTTP task
//!
//! Serves the form on the access-point interface and forwards decoded
//! submissions to the network manager over [`SUBMISSIONS`]. The form content
//! is published by the manager through [`PORTAL_FORM`] when the portal opens.

use core::cell::RefCell;
use core::fmt::Write as _;

use embassy_net::tcp::TcpSocket;
use embassy_net::{IpListenEndpoint, Stack};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, with_timeout};
use embedded_io_async::Write;
use heapless::{String, Vec};
use log::{debug, info, warn};
use ticker_core::network::PortalField;
use ticker_core::portal::{
    PortalError, PortalRoute, PortalSubmission, TruncatingWriter, parse_submission, render_form,
    render_saved, route_request,
};

const HTTP_PORT: u16 = 80;
const REQUEST_MAX: usize = 1024;
const PAGE_MAX: usize = 4096;
const SOCKET_BUF: usize = 1536;

/// What the portal shows, published while it is open
pub struct PortalForm {
    pub ssid: &'static str,
    pub fields: Vec<PortalField, 2>,
}

pub static PORTAL_FORM: Mutex<CriticalSectionRawMutex, RefCell<Option<PortalForm>>> =
    Mutex::new(RefCell::new(None));

/// Decoded submissions, drained by the network manager's `poll`
pub static SUBMISSIONS: Channel<CriticalSectionRawMutex, PortalSubmission, 1> = Channel::new();

#[embassy_executor::task]
pub async fn portal_http_task(stack: Stack<'static>, portal_ip: [u8; 4]) {
    let mut rx_buffer = [0u8; SOCKET_BUF];
    let mut tx_buffer = [0u8; SOCKET_BUF];
    let mut request = [0u8; REQUEST_MAX];

    stack.wait_config_up().await;
    info!("Portal HTTP server listening on port {}", HTTP_PORT);

    loop {
        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(10)));

        if let Err(e) = socket
            .accept(IpListenEndpoint {
                addr: None,
                port: HTTP_PORT,
            })
            .await
        {
            warn!("Portal accept failed: {:?}", e);
            continue;
        }

        if let Err(e) = handle_connection(&mut socket, &mut request, portal_ip).await {
            debug!("Portal request dropped: {:?}", e);
        }

        let _ = with_timeout(Duration::from_millis(250), socket.flush()).await;
        socket.close();
    }
}

async fn handle_connection(
    socket: &mut TcpSocket<'_>,
    buf: &mut [u8; REQUEST_MAX],
    portal_ip: [u8; 4],
) -> Result<(), embassy_net::tcp::Error> {
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = socket.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
        if buf[..filled].windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    let request = core::str::from_utf8(&buf[..filled]).unwrap_or("");
    let mut page: String<PAGE_MAX> = String::new();
    let mut location = false;

    let status = match route_request(request) {
        Ok(PortalRoute::Form) => {
            render_current_form(&mut page);
            "200 OK"
        }
        Ok(PortalRoute::Save(query)) => match parse_submission(query) {
            Ok(submission) => {
                let _ = render_saved(&mut TruncatingWriter(&mut page), &submission.ssid);
                if SUBMISSIONS.try_send(submission).is_err() {
                    warn!("Portal submission dropped: previous one still pending");
                }
                "200 OK"
            }
            Err(e) => bad_request(&mut page, e),
        },
        Ok(PortalRoute::Redirect) => {
            location = true;
            "302 Found"
        }
        Ok(PortalRoute::NotFound) => {
            let _ = page.push_str("Not found");
            "404 Not Found"
        }
        Err(e) => bad_request(&mut page, e),
    };

    let mut header: String<192> = String::new();
    let mut writer = TruncatingWriter(&mut header);
    let _ = write!(writer, "HTTP/1.1 {}\r\n", status);
    if location {
        let [a, b, c, d] = portal_ip;
        let _ = write!(writer, "Location: http://{}.{}.{}.{}/\r\n", a, b, c, d);
    }
    let _ = write!(
        writer,
        "Content-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        page.len()
    );

    socket.write_all(header.as_bytes()).await?;
    socket.write_all(page.as_bytes()).await
}

fn render_current_form(page: &mut String<PAGE_MAX>) {
    PORTAL_FORM.lock(|form| {
        let form = form.borrow();
        let (ssid, fields) = match form.as_ref() {
            Some(form) => (form.ssid, form.fields.as_slice()),
            None => ("Configuration", &[][..]),
        };
        let _ = render_form(&mut TruncatingWriter(page), ssid, fields);
    });
}

fn bad_request(page: &mut String<PAGE_MAX>, error: PortalError) -> &'static str {
    debug!("Rejected portal request: {}", error);
    let _ = core::fmt::write(&mut TruncatingWriter(page), format_args!("{}", error));
    "400 Bad Request"
}
