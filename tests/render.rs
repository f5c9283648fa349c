//! Rendering tests against a real pdfium library.
//!
//! Gated behind `FLOWSTEP_PDFIUM_TESTS` because they need libpdfium at
//! runtime (`PDFIUM_LIB_PATH`, the working directory, or a system install).
//! Fixtures are built in memory, so no test files are required.
//!
//! Run with:
//!   FLOWSTEP_PDFIUM_TESTS=1 PDFIUM_LIB_PATH=/opt/pdfium/lib cargo test --test render -- --nocapture

use flowstep::pipeline::encode::{encode_pages, page_file_name};
use flowstep::pipeline::render::render_pdf;
use flowstep::{run_step, InferenceBackend, StepConfig, StepError, StepKind, WorkflowContext};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::{json, Value};

/// Skip this test unless FLOWSTEP_PDFIUM_TESTS is set.
macro_rules! skip_unless_pdfium {
    () => {
        if std::env::var("FLOWSTEP_PDFIUM_TESTS").is_err() {
            println!("SKIP: set FLOWSTEP_PDFIUM_TESTS=1 to run pdfium tests");
            return;
        }
    };
}

/// A valid PDF with `pages` blank 200×100 pt pages and a correct xref table.
fn blank_pdf(pages: usize) -> Vec<u8> {
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {pages} >>",
            (0..pages)
                .map(|i| format!("{} 0 R", i + 3))
                .collect::<Vec<_>>()
                .join(" ")
        ),
    ];
    for _ in 0..pages {
        objects.push("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 100] >>".to_string());
    }

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }

    let xref_at = pdf.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for off in offsets {
        xref.push_str(&format!("{off:010} 00000 n \n"));
    }
    xref.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
        objects.len() + 1
    ));
    pdf.extend_from_slice(xref.as_bytes());
    pdf
}

/// The multipart `filename` of a mocked request.
fn multipart_file_name(req: &mockito::Request) -> String {
    let body = req
        .body()
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .unwrap_or_default();
    body.split("filename=\"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap_or_default()
        .to_string()
}

/// Upload route that stores every page under its own file name.
async fn mock_page_uploads(server: &mut ServerGuard, expected: usize) -> mockito::Mock {
    server
        .mock(
            "POST",
            Matcher::Regex(r"^/api/uploads/upload/.*extracted_files$".to_string()),
        )
        .with_header("content-type", "application/json")
        .with_body_from_request(|req| {
            json!({"files": [{"path": format!("plans/extracted_files/{}", multipart_file_name(req))}]})
                .to_string()
                .into_bytes()
        })
        .expect(expected)
        .create_async()
        .await
}

fn local_pdf(dir: &tempfile::TempDir, pages: usize) -> String {
    let pdf_path = dir.path().join("site plan.pdf");
    std::fs::write(&pdf_path, blank_pdf(pages)).unwrap();
    pdf_path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn renders_every_page_in_order() {
    skip_unless_pdfium!();

    let images = render_pdf("blank.pdf", blank_pdf(3), 2.0).await.unwrap();
    assert_eq!(images.len(), 3);
    for img in &images {
        assert_eq!((img.width(), img.height()), (400, 200));
    }

    let pages = encode_pages(&images, "blank.pdf").unwrap();
    for (idx, page) in pages.iter().enumerate() {
        assert_eq!(page.page_num, idx + 1);
        assert_eq!(page.file_name, page_file_name("blank.pdf", idx + 1));
        let decoded = image::load_from_memory(&page.bytes).expect("page should decode");
        assert_eq!(decoded.width(), 400);
    }
}

#[tokio::test]
async fn corrupt_pdf_fails_whole_document() {
    skip_unless_pdfium!();

    let mut bytes = b"%PDF-1.4\n".to_vec();
    bytes.extend_from_slice(&[0u8; 64]);
    let err = render_pdf("broken.pdf", bytes, 2.0).await.unwrap_err();
    assert!(matches!(err, StepError::CorruptPdf { .. }), "got {err:?}");
}

#[tokio::test]
async fn pdf_ocr_from_local_file() {
    skip_unless_pdfium!();

    let dir = tempfile::tempdir().unwrap();
    let mut server = Server::new_async().await;
    let upload = mock_page_uploads(&mut server, 3).await;
    let tool = server
        .mock("POST", "/api/tools/execute-method")
        .with_header("content-type", "application/json")
        .with_body(r#"{"success": true, "result": "blank page"}"#)
        .expect(3)
        .create_async()
        .await;

    let config = StepConfig::builder()
        .api_base_url(server.url())
        .token("t")
        .inference_backend(InferenceBackend::Tool)
        .build()
        .unwrap();
    let ctx = WorkflowContext::from_value(json!({
        "dpr_file": {"file_path": local_pdf(&dir, 3)}
    }))
    .unwrap();

    let out = run_step(StepKind::PdfOcr, &ctx, &config).await.unwrap();

    assert_eq!(out.get("pdf_name"), Some(&json!("site plan.pdf")));
    assert_eq!(
        out.get("ocr_results").and_then(Value::as_str),
        Some("blank page\n\nblank page\n\nblank page")
    );
    upload.assert_async().await;
    tool.assert_async().await;
}

#[tokio::test]
async fn convert_pdf_to_images_lists_pages_in_order() {
    skip_unless_pdfium!();

    let dir = tempfile::tempdir().unwrap();
    let mut server = Server::new_async().await;
    let upload = mock_page_uploads(&mut server, 3).await;

    let config = StepConfig::builder()
        .api_base_url(server.url())
        .token("t")
        .build()
        .unwrap();
    let ctx = WorkflowContext::from_value(json!({
        "pdf_file": {"file_path": local_pdf(&dir, 3)}
    }))
    .unwrap();

    let out = run_step(StepKind::ConvertPdfToImages, &ctx, &config)
        .await
        .unwrap();

    assert_eq!(out.get("pdf_name"), Some(&json!("site plan.pdf")));
    assert_eq!(
        out.get("images_data"),
        Some(&json!([
            "plans/extracted_files/site plan_page_1.png",
            "plans/extracted_files/site plan_page_2.png",
            "plans/extracted_files/site plan_page_3.png"
        ]))
    );
    upload.assert_async().await;
}

#[tokio::test]
async fn pdf_ocr_with_agent_sends_page_bytes() {
    skip_unless_pdfium!();

    let dir = tempfile::tempdir().unwrap();
    let mut server = Server::new_async().await;
    let upload = mock_page_uploads(&mut server, 3).await;
    let agent = server
        .mock("POST", "/api/agent-runtime/run")
        .match_header("authorization", "Bearer t")
        .with_header("content-type", "application/json")
        .with_body_from_request(|req| {
            json!({"content": format!("text of {}", multipart_file_name(req))})
                .to_string()
                .into_bytes()
        })
        .expect(3)
        .create_async()
        .await;

    let config = StepConfig::builder()
        .api_base_url(server.url())
        .token("t")
        .inference_backend(InferenceBackend::Agent)
        .build()
        .unwrap();
    let ctx = WorkflowContext::from_value(json!({
        "dpr_file": {"file_path": local_pdf(&dir, 3)}
    }))
    .unwrap();

    let out = run_step(StepKind::PdfOcr, &ctx, &config).await.unwrap();

    assert_eq!(out.get("pdf_name"), Some(&json!("site plan.pdf")));
    assert_eq!(
        out.get("ocr_results").and_then(Value::as_str),
        Some(
            "text of site plan_page_1.png\n\n\
             text of site plan_page_2.png\n\n\
             text of site plan_page_3.png"
        )
    );
    upload.assert_async().await;
    agent.assert_async().await;
}
