use axum::response::IntoResponse;

/// Plain banner for the bare root path, outside the documented surface.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"), "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_root_banner_names_the_service() {
        let response = root().await.into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let banner = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(banner.starts_with(env!("CARGO_PKG_NAME")));
        assert!(banner.ends_with('\n'));
    }
}
