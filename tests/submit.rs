use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;

use kira_sra_blast::domain::BlastProgram;
use kira_sra_blast::error::KiraError;
use kira_sra_blast::pacing::Clock;
use kira_sra_blast::submit::{JobSubmitter, SessionCookie, SubmitParams, WebDriverSubmitter};
use kira_sra_blast::webdriver::{BrowserOptions, WebDriver};

struct ManualClock {
    now: Mutex<Instant>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
            sleeps: Mutex::new(Vec::new()),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        *self.now.lock().unwrap() += duration;
        self.sleeps.lock().unwrap().push(duration);
    }
}

#[derive(Default)]
struct DriverLog {
    clicks: usize,
    deletes: Vec<String>,
    typed: Vec<String>,
}

/// A loopback WebDriver endpoint. After the n-th click it serves `pages[n - 1]`
/// (the last page once the list runs out).
struct FakeDriver {
    endpoint: String,
    log: Arc<Mutex<DriverLog>>,
}

impl FakeDriver {
    fn start(pages: Vec<&'static str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let log = Arc::new(Mutex::new(DriverLog::default()));
        let shared = log.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                serve(stream, &pages, &shared);
            }
        });
        Self { endpoint, log }
    }
}

fn serve(stream: TcpStream, pages: &[&str], log: &Mutex<DriverLog>) {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let mut content_length = 0;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).is_err() || line.trim().is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }
    let mut body = vec![0; content_length];
    if reader.read_exact(&mut body).is_err() {
        return;
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();
    let value = {
        let mut log = log.lock().unwrap();
        match (method, path) {
            ("POST", "/session") => serde_json::json!({ "sessionId": "s1", "capabilities": {} }),
            ("POST", path) if path.ends_with("/element") => {
                serde_json::json!({ "element-6066-11e4-a52e-4f735466cecf": "e1" })
            }
            ("POST", path) if path.ends_with("/value") => {
                let sent: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();
                log.typed
                    .push(sent["text"].as_str().unwrap_or_default().to_string());
                serde_json::Value::Null
            }
            ("POST", path) if path.ends_with("/click") => {
                log.clicks += 1;
                serde_json::Value::Null
            }
            ("GET", path) if path.ends_with("/source") => {
                let index = log.clicks.saturating_sub(1).min(pages.len() - 1);
                serde_json::json!(pages[index])
            }
            ("GET", path) if path.ends_with("/cookie") => {
                serde_json::json!([{ "name": "WebCubbyUser", "value": "abc" }])
            }
            ("DELETE", path) => {
                log.deletes.push(path.to_string());
                serde_json::Value::Null
            }
            _ => serde_json::Value::Null,
        }
    };

    let payload = serde_json::json!({ "value": value }).to_string();
    let mut stream = reader.into_inner();
    let _ = write!(
        stream,
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        payload.len(),
        payload
    );
    let _ = stream.flush();
}

fn submitter(driver: &FakeDriver, clock: Arc<ManualClock>) -> WebDriverSubmitter {
    let options = BrowserOptions {
        user_agent: "KiraSraBlast/test".to_string(),
        proxy: None,
        headless: true,
    };
    WebDriverSubmitter::new(WebDriver::new(&driver.endpoint).unwrap(), options, clock)
        .with_settle_delay(Duration::from_secs(4))
}

fn params() -> SubmitParams {
    SubmitParams::new(
        vec!["SRX885418".to_string()],
        BlastProgram::Blastn,
        ">rps7_0\nAATCATTCCATTG".to_string(),
    )
}

#[test]
fn rid_on_first_wait_page() {
    let driver = FakeDriver::start(vec![r#"<input name="RID" type="hidden" value="RID001">"#]);
    let clock = Arc::new(ManualClock::new());
    let context = submitter(&driver, clock.clone()).submit(&params()).unwrap();

    assert_eq!(context.rid(), "RID001");
    assert_eq!(
        context.cookies,
        vec![SessionCookie {
            name: "WebCubbyUser".to_string(),
            value: "abc".to_string(),
        }]
    );
    let log = driver.log.lock().unwrap();
    assert_eq!(log.clicks, 1);
    assert_eq!(log.deletes, vec!["/session/s1"]);
    assert_eq!(log.typed, vec![">rps7_0\nAATCATTCCATTG"]);
    assert_eq!(*clock.sleeps.lock().unwrap(), vec![Duration::from_secs(4); 3]);
}

#[test]
fn form_is_clicked_again_once_without_rid() {
    let driver = FakeDriver::start(vec![
        "<html></html>",
        r#"<input name="RID" type="hidden" value="ABC123">"#,
    ]);
    let context = submitter(&driver, Arc::new(ManualClock::new()))
        .submit(&params())
        .unwrap();

    assert_eq!(context.rid(), "ABC123");
    let log = driver.log.lock().unwrap();
    assert_eq!(log.clicks, 2);
    assert_eq!(log.deletes, vec!["/session/s1"]);
}

#[test]
fn scraped_error_after_second_click_releases_session() {
    let driver = FakeDriver::start(vec![
        "<html></html>",
        r#"<p class="error">Query contains <b>no</b> data</p>"#,
    ]);
    let err = submitter(&driver, Arc::new(ManualClock::new()))
        .submit(&params())
        .unwrap_err();

    assert_matches!(&err, KiraError::Submission(message) if message.contains("Query contains no data"));
    let log = driver.log.lock().unwrap();
    assert_eq!(log.clicks, 2);
    assert_eq!(log.deletes, vec!["/session/s1"]);
}

#[test]
fn no_rid_and_no_error_text() {
    let driver = FakeDriver::start(vec!["<html></html>"]);
    let err = submitter(&driver, Arc::new(ManualClock::new()))
        .submit(&params())
        .unwrap_err();

    assert_matches!(&err, KiraError::Submission(message) if message.contains("no RID"));
    let log = driver.log.lock().unwrap();
    assert_eq!(log.clicks, 2);
    assert_eq!(log.deletes.len(), 1);
}
