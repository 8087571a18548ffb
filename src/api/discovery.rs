use axum::{
    http::{HeaderMap, HeaderValue, StatusCode, header::LINK},
    response::IntoResponse,
};

const LINKS: [&str; 2] = [r#"<predict>; rel="restconf""#, r#"<index.html>; rel="index""#];

/// 本文なしで、入口となるリソースを `Link` ヘッダーで示す。
pub(crate) async fn links() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    for link in LINKS {
        headers.append(LINK, HeaderValue::from_static(link));
    }
    (StatusCode::NO_CONTENT, headers)
}

pub(crate) async fn ping() -> StatusCode {
    StatusCode::OK
}
