use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use tracing::debug;

use crate::error::FetchError;
use crate::fetcher::PageFetcher;
use crate::model::FetchedPage;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
const TITLE_SELECTOR: &str = "#productTitle";
/// Tried in order; the first match wins.
const PRICE_SELECTORS: &[&str] = &[
    "#priceblock_dealprice",
    "#priceblock_ourprice",
    "#priceblock_saleprice",
    "span.a-offscreen",
    "span.a-price-whole",
];

/// Scrapes product pages over HTTP.
pub struct HttpFetcher {
    client: reqwest::Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl HttpFetcher {
    pub fn new(requests_per_second: NonZeroU32) -> Result<Self, Report<FetchError>> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .change_context(FetchError::Unreachable)
            .attach("failed to build HTTP client")?;

        let quota = Quota::per_second(requests_per_second);
        Ok(Self {
            client,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(
        &self,
        url: &str,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<FetchedPage, Report<FetchError>>> {
        let url = url.to_owned();
        Box::pin(async move {
            self.rate_limiter.until_ready().await;

            let response = self
                .client
                .get(&url)
                .timeout(timeout)
                .send()
                .await
                .map_err(classify_request_error)
                .attach_with(|| format!("url: {url}"))?;

            let status = response.status();
            if !status.is_success() {
                let context = match status {
                    StatusCode::NOT_FOUND | StatusCode::GONE => FetchError::NotFound,
                    _ => FetchError::Unreachable,
                };
                return Err(Report::new(context)
                    .attach(format!("HTTP status: {status}"))
                    .attach(format!("url: {url}")));
            }

            let body = response
                .text()
                .await
                .map_err(classify_request_error)
                .attach_with(|| format!("url: {url}"))?;

            debug!(url = %url, bytes = body.len(), "product page downloaded");
            parse_product_page(&body).attach_with(|| format!("url: {url}"))
        })
    }
}

fn classify_request_error(err: reqwest::Error) -> Report<FetchError> {
    let context = if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Unreachable
    };
    Report::new(err).change_context(context)
}

/// Extract the product title and price from a product page.
pub fn parse_product_page(html: &str) -> Result<FetchedPage, Report<FetchError>> {
    let document = Html::parse_document(html);

    let title = Selector::parse(TITLE_SELECTOR)
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_owned())
        })
        .filter(|title| !title.is_empty())
        .ok_or_else(|| Report::new(FetchError::ParseFailure).attach("title not found"))?;

    let price_text = PRICE_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| {
            document
                .select(&selector)
                .next()
                .map(|el| el.text().collect::<String>())
        })
        .ok_or_else(|| {
            Report::new(FetchError::ParseFailure)
                .attach("price not found, product may be unavailable")
        })?;

    let price = parse_price_text(&price_text)?;
    Ok(FetchedPage { title, price })
}

/// Reduce a displayed price such as `"₹2,999.00"` to a decimal.
fn parse_price_text(text: &str) -> Result<Decimal, Report<FetchError>> {
    let digits: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    // Currency markers such as "Rs." leave stray dots at either end.
    let digits = digits.trim_matches('.');

    Decimal::from_str(digits)
        .change_context(FetchError::ParseFailure)
        .attach_with(|| format!("price text: {text:?}"))
}
