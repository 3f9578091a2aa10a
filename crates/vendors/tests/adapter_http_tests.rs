//! Adapter HTTP behavior against a mock vendor.
//!
//! These exercise the real request path (session pool, headers, error
//! translation) without touching any municipal site.

use std::sync::Arc;

use chrono::{Duration, Local};
use common::Vendor;
use vendors::adapter::{AdapterCore, VendorAdapter};
use vendors::adapters::legistar::LegistarAdapter;
use vendors::adapters::primegov::PrimeGovAdapter;
use vendors::session::SessionPool;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn core(vendor: Vendor, slug: &str) -> AdapterCore {
    AdapterCore::new(vendor, slug, Arc::new(SessionPool::new())).unwrap()
}

fn iso_now() -> String {
    Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S").to_string()
}

const PRIMEGOV_HTML_AGENDA: &str = r#"
<html><body>
  <p>Public comments may be sent to city.clerk@cityofpaloalto.org</p>
  <div class="agenda-item" data-item-id="9001">
    <span class="item-number">1.</span>
    <span class="item-title">Adopt RES-2025-123 approving the operating budget</span>
    <a href="/api/compilemeetingattachmenthistory/historyattachment/?historyId=abc">Staff Report</a>
  </div>
  <div class="agenda-item" data-item-id="9002">
    <span class="item-number">2.</span>
    <span class="item-title">Roll Call</span>
  </div>
</body></html>
"#;

#[tokio::test]
async fn primegov_routes_html_agendas_and_pdf_packets() {
    let server = MockServer::start().await;

    let upcoming = serde_json::json!([
        {
            "id": 101,
            "title": "City Council",
            "dateTime": iso_now(),
            "documentList": [
                {"templateName": "HTML Agenda", "templateId": 42}
            ]
        },
        {
            "id": 102,
            "title": "Planning Commission",
            "dateTime": iso_now(),
            "documentList": [
                {"templateName": "Agenda Packet", "templateId": 99, "compileOutputType": "pdf"}
            ]
        }
    ]);

    Mock::given(method("GET"))
        .and(path("/api/v2/PublicPortal/ListUpcomingMeetings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&upcoming))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/PublicPortal/ListArchivedMeetings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Portal/Meeting"))
        .and(query_param("meetingTemplateId", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PRIMEGOV_HTML_AGENDA))
        .mount(&server)
        .await;

    let adapter =
        PrimeGovAdapter::with_base_url(core(Vendor::Primegov, "cityofpaloalto"), server.uri());
    let meetings = adapter.fetch_meetings(7, 14).await;
    assert_eq!(meetings.len(), 2);

    let council = meetings.iter().find(|m| m.vendor_id == "101").unwrap();
    assert_eq!(
        council.agenda_url.as_deref(),
        Some(format!("{}/Portal/Meeting?meetingTemplateId=42", server.uri()).as_str())
    );
    assert!(council.packet_url.is_none());
    // The procedural "Roll Call" item is filtered; the matter item stays.
    assert_eq!(council.items.len(), 1);
    assert_eq!(council.items[0].vendor_item_id, "9001");
    assert_eq!(council.items[0].attachments.len(), 1);
    assert_eq!(
        council.participation.as_ref().unwrap().email.as_deref(),
        Some("city.clerk@cityofpaloalto.org")
    );

    let planning = meetings.iter().find(|m| m.vendor_id == "102").unwrap();
    assert_eq!(
        planning.packet_url.as_deref(),
        Some(
            format!(
                "{}/Public/CompiledDocument?meetingTemplateId=99&compileOutputType=pdf",
                server.uri()
            )
            .as_str()
        )
    );
    assert!(planning.agenda_url.is_none());
    assert!(planning.items.is_empty());
}

#[tokio::test]
async fn primegov_marks_cancelled_meetings() {
    let server = MockServer::start().await;

    let upcoming = serde_json::json!([
        {
            "id": 103,
            "title": "City Council (CANCELLED)",
            "dateTime": iso_now(),
            "documentList": [
                {"templateName": "Agenda Packet", "templateId": 7, "compileOutputType": "pdf"}
            ]
        }
    ]);
    Mock::given(method("GET"))
        .and(path("/api/v2/PublicPortal/ListUpcomingMeetings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&upcoming))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/PublicPortal/ListArchivedMeetings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let adapter =
        PrimeGovAdapter::with_base_url(core(Vendor::Primegov, "cityofpaloalto"), server.uri());
    let meetings = adapter.fetch_meetings(7, 14).await;
    assert_eq!(meetings.len(), 1);
    assert_eq!(
        meetings[0].meeting_status,
        Some(db::models::MeetingStatus::Cancelled)
    );
}

#[tokio::test]
async fn legistar_falls_back_to_html_calendar_on_api_403() {
    let server = MockServer::start().await;
    let tomorrow = (Local::now().naive_local() + Duration::days(1))
        .format("%m/%d/%Y")
        .to_string();

    Mock::given(method("GET"))
        .and(path("/api/Events"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Calendar.aspx"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<table><tbody>
                <tr class="rgRow">
                  <td><a href="MeetingDetail.aspx?ID=771&GUID=AAA">City Council</a></td>
                  <td>{tomorrow}</td>
                  <td></td>
                  <td>6:00 PM</td>
                  <td><a href="View.ashx?M=A&ID=55">Agenda</a></td>
                </tr>
            </tbody></table>"#
        )))
        .mount(&server)
        .await;

    let adapter = LegistarAdapter::with_bases(
        core(Vendor::Legistar, "seattle"),
        format!("{}/api", server.uri()),
        server.uri(),
        None,
    );
    let meetings = adapter.fetch_meetings(7, 14).await;
    assert_eq!(meetings.len(), 1);
    assert_eq!(meetings[0].vendor_id, "771");
    assert_eq!(meetings[0].title, "City Council");
    assert!(meetings[0].packet_url.as_deref().unwrap().contains("View.ashx"));
}

#[tokio::test]
async fn adapter_failure_is_reported_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let adapter =
        PrimeGovAdapter::with_base_url(core(Vendor::Primegov, "cityofpaloalto"), server.uri());

    // The listing helpers swallow per-endpoint failures; the fetch as a
    // whole succeeds with zero meetings rather than erroring out.
    let result = adapter.fetch_result(7, 14).await;
    assert!(result.success());
    assert!(result.meetings.is_empty());
}

#[tokio::test]
async fn legistar_api_error_surfaces_in_fetch_result() {
    let server = MockServer::start().await;
    // 500 is not a fallback status; it propagates to the safety net.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let adapter = LegistarAdapter::with_bases(
        core(Vendor::Legistar, "seattle"),
        format!("{}/api", server.uri()),
        server.uri(),
        None,
    );
    let result = adapter.fetch_result(7, 14).await;
    assert!(!result.success());
    assert!(result.error.as_deref().unwrap().contains("500"));
    assert!(adapter.fetch_meetings(7, 14).await.is_empty());
}

#[tokio::test]
async fn garbage_json_becomes_empty_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let adapter =
        PrimeGovAdapter::with_base_url(core(Vendor::Primegov, "cityofpaloalto"), server.uri());
    let meetings = adapter.fetch_meetings(7, 14).await;
    assert!(meetings.is_empty());
}
