//! NCBI E-utilities client: PubMed metadata plus PMC full text.

use chrono::Utc;
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::RetrievalConfig;
use crate::models::{PaperRecord, Pmid};
use crate::retrieval::{RequestPacer, RetrievalError};
use crate::utils::{with_retry, HttpClient, RetryConfig};

/// E-utilities base URL.
const EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Tool name sent with every request, per NCBI usage policy.
const TOOL_NAME: &str = "bioanalyzer";

/// Client for the PubMed/PMC E-utilities endpoints.
///
/// Every request goes through the shared [`RequestPacer`] and the retry
/// policy; each attempt re-acquires the pacer so retries are paced like any
/// other request.
#[derive(Debug, Clone)]
pub struct EutilsClient {
    http: HttpClient,
    pacer: Arc<RequestPacer>,
    retry: RetryConfig,
    base_url: String,
    api_key: Option<String>,
    email: String,
    attempt_timeout: Duration,
}

impl EutilsClient {
    pub fn new(config: &RetrievalConfig, api_key: Option<String>) -> Self {
        let attempt_timeout = config.attempt_timeout();
        Self {
            http: HttpClient::new(attempt_timeout),
            pacer: Arc::new(RequestPacer::new(config.min_request_interval())),
            retry: config.retry_config(),
            base_url: EUTILS_BASE_URL.to_string(),
            api_key,
            email: config.email.clone(),
            attempt_timeout,
        }
    }

    /// Point the client at a different base URL (for testing).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Share a pacer across clients (one upstream target, one pacing clock).
    pub fn with_pacer(mut self, pacer: Arc<RequestPacer>) -> Self {
        self.pacer = pacer;
        self
    }

    /// Fetch the metadata subset of a paper record (no full text).
    pub async fn fetch_metadata(&self, pmid: &Pmid) -> Result<PaperRecord, RetrievalError> {
        let url = self.build_url(
            "efetch.fcgi",
            &[("db", "pubmed"), ("id", pmid.as_str()), ("retmode", "xml")],
        );
        let xml = self.get_with_retry(&url).await?;
        parse_pubmed_article(&xml, pmid)
    }

    /// Fetch the PMC full text for a paper. An empty string means the paper
    /// has no open-access deposit; that is a normal outcome, not an error.
    pub async fn fetch_fulltext(&self, pmid: &Pmid) -> Result<String, RetrievalError> {
        let Some(pmc_id) = self.lookup_pmc_id(pmid).await? else {
            tracing::debug!(%pmid, "no PMC deposit linked");
            return Ok(String::new());
        };

        let url = self.build_url(
            "efetch.fcgi",
            &[("db", "pmc"), ("id", &pmc_id), ("retmode", "xml")],
        );
        let xml = self.get_with_retry(&url).await?;
        Ok(parse_jats_body(&xml))
    }

    /// Compose metadata and full text into one record. Metadata failure fails
    /// the whole operation; a full-text failure degrades to an abstract-only
    /// record.
    pub async fn fetch_full_paper(&self, pmid: &Pmid) -> Result<PaperRecord, RetrievalError> {
        let mut record = self.fetch_metadata(pmid).await?;

        match self.fetch_fulltext(pmid).await {
            Ok(text) => {
                record.has_full_text = !text.trim().is_empty();
                record.full_text = text;
            }
            Err(err) => {
                tracing::warn!(%pmid, error = %err, "full text unavailable, continuing with abstract only");
            }
        }

        tracing::info!(
            %pmid,
            has_full_text = record.has_full_text,
            "retrieved paper"
        );
        Ok(record)
    }

    /// Resolve the PMC identifier linked to a PMID via elink.
    async fn lookup_pmc_id(&self, pmid: &Pmid) -> Result<Option<String>, RetrievalError> {
        let url = self.build_url(
            "elink.fcgi",
            &[
                ("dbfrom", "pubmed"),
                ("db", "pmc"),
                ("id", pmid.as_str()),
                ("retmode", "xml"),
            ],
        );
        let xml = self.get_with_retry(&url).await?;
        parse_elink_pmc_id(&xml)
    }

    fn build_url(&self, endpoint: &str, params: &[(&str, &str)]) -> String {
        let mut pairs: Vec<(&str, &str)> = params.to_vec();
        if let Some(key) = self.api_key.as_deref() {
            pairs.push(("api_key", key));
        }
        pairs.push(("email", &self.email));
        pairs.push(("tool", TOOL_NAME));

        let query = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}/{}?{}", self.base_url, endpoint, query)
    }

    async fn get_with_retry(&self, url: &str) -> Result<String, RetrievalError> {
        with_retry(&self.retry, || self.dispatch(url)).await
    }

    /// One paced, bounded request attempt.
    async fn dispatch(&self, url: &str) -> Result<String, RetrievalError> {
        self.pacer.acquire().await;

        let response = timeout(self.attempt_timeout, self.http.get(url).send())
            .await
            .map_err(|_| RetrievalError::Timeout)?
            .map_err(|e| {
                if e.is_timeout() {
                    RetrievalError::Timeout
                } else {
                    RetrievalError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(RetrievalError::RateLimited { retry_after });
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RetrievalError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(RetrievalError::Status(status.as_u16()));
        }

        timeout(self.attempt_timeout, response.text())
            .await
            .map_err(|_| RetrievalError::Timeout)?
            .map_err(|e| RetrievalError::Network(e.to_string()))
    }
}

// ---- PubMed efetch envelope ----

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubmedArticleSet {
    #[serde(rename = "PubmedArticle", default)]
    articles: Vec<PubmedArticle>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubmedArticle {
    MedlineCitation: Option<MedlineCitation>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct MedlineCitation {
    Article: Option<Article>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Article {
    Journal: Option<Journal>,
    ArticleTitle: Option<TextNode>,
    Abstract: Option<Abstract>,
    AuthorList: Option<AuthorList>,
    ArticleDate: Option<ArticleDate>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Journal {
    Title: Option<TextNode>,
    JournalIssue: Option<JournalIssue>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct JournalIssue {
    PubDate: Option<PubDate>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubDate {
    Year: Option<String>,
    #[serde(rename = "MedlineDate")]
    medline_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct ArticleDate {
    Year: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Abstract {
    #[serde(rename = "AbstractText", default)]
    sections: Vec<TextNode>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct AuthorList {
    #[serde(rename = "Author", default)]
    authors: Vec<Author>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Author {
    LastName: Option<TextNode>,
    ForeName: Option<TextNode>,
    CollectiveName: Option<TextNode>,
}

fn parse_pubmed_article(xml: &str, pmid: &Pmid) -> Result<PaperRecord, RetrievalError> {
    let envelope: PubmedArticleSet = from_str(xml)
        .map_err(|e| RetrievalError::Parse(format!("PubMed efetch XML: {}", e)))?;

    // An empty article set for a well-formed numeric PMID means the record
    // does not exist; that is permanent, never retried.
    let article = envelope
        .articles
        .into_iter()
        .next()
        .and_then(|a| a.MedlineCitation)
        .and_then(|m| m.Article)
        .ok_or_else(|| RetrievalError::NotFound(pmid.to_string()))?;

    let title = article
        .ArticleTitle
        .as_ref()
        .and_then(|t| t.text.clone())
        .unwrap_or_default();

    let journal = article
        .Journal
        .as_ref()
        .and_then(|j| j.Title.as_ref())
        .and_then(|t| t.text.clone())
        .unwrap_or_default();

    let publication_date = article
        .Journal
        .as_ref()
        .and_then(|j| j.JournalIssue.as_ref())
        .and_then(|ji| ji.PubDate.as_ref())
        .and_then(|pd| pd.Year.clone().or_else(|| pd.medline_date.clone()))
        .or_else(|| article.ArticleDate.as_ref().and_then(|d| d.Year.clone()))
        .unwrap_or_default();

    let r#abstract = article
        .Abstract
        .as_ref()
        .map(|ab| {
            ab.sections
                .iter()
                .filter_map(|s| s.text.as_deref())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    let authors = article
        .AuthorList
        .as_ref()
        .map(|al| {
            al.authors
                .iter()
                .filter_map(|author| {
                    if let Some(collective) =
                        author.CollectiveName.as_ref().and_then(|c| c.text.clone())
                    {
                        return Some(collective);
                    }
                    let last = author.LastName.as_ref().and_then(|n| n.text.as_deref())?;
                    let fore = author
                        .ForeName
                        .as_ref()
                        .and_then(|n| n.text.as_deref())
                        .unwrap_or("");
                    Some(format!("{} {}", fore, last).trim().to_string())
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(PaperRecord {
        pmid: pmid.clone(),
        title,
        authors,
        journal,
        publication_date,
        r#abstract,
        full_text: String::new(),
        has_full_text: false,
        retrieved_at: Utc::now(),
    })
}

// ---- elink envelope ----

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct ELinkResult {
    #[serde(rename = "LinkSet", default)]
    link_sets: Vec<LinkSet>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct LinkSet {
    #[serde(rename = "LinkSetDb", default)]
    dbs: Vec<LinkSetDb>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct LinkSetDb {
    DbTo: Option<String>,
    LinkName: Option<String>,
    #[serde(rename = "Link", default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Link {
    Id: Option<String>,
}

fn parse_elink_pmc_id(xml: &str) -> Result<Option<String>, RetrievalError> {
    let envelope: ELinkResult =
        from_str(xml).map_err(|e| RetrievalError::Parse(format!("elink XML: {}", e)))?;

    // Only the direct pubmed_pmc link counts; pubmed_pmc_refs would point at
    // papers citing this one.
    for link_set in &envelope.link_sets {
        for db in &link_set.dbs {
            if db.DbTo.as_deref() == Some("pmc") && db.LinkName.as_deref() == Some("pubmed_pmc") {
                if let Some(id) = db.links.iter().find_map(|l| l.Id.clone()) {
                    return Ok(Some(id));
                }
            }
        }
    }
    Ok(None)
}

// ---- JATS full-text body ----

/// Pull paragraph text out of a PMC JATS article body. Malformed or bodyless
/// documents yield an empty string, which callers treat as "no full text".
fn parse_jats_body(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_body = false;
    let mut paragraph_depth = 0usize;
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"body" => in_body = true,
                b"p" if in_body => paragraph_depth += 1,
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"body" => in_body = false,
                b"p" if in_body && paragraph_depth > 0 => {
                    paragraph_depth -= 1;
                    if paragraph_depth == 0 {
                        let text = current.trim().to_string();
                        if !text.is_empty() {
                            paragraphs.push(text);
                        }
                        current.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Text(t)) if in_body && paragraph_depth > 0 => {
                if let Ok(text) = t.unescape() {
                    if !current.is_empty() && !current.ends_with(' ') {
                        current.push(' ');
                    }
                    current.push_str(text.trim());
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                tracing::debug!(error = %err, "stopping JATS parse at malformed markup");
                break;
            }
            _ => {}
        }
    }

    paragraphs.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE_XML: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">34845010</PMID>
      <Article>
        <Journal>
          <Title>Gut Microbes</Title>
          <JournalIssue>
            <PubDate><Year>2021</Year></PubDate>
          </JournalIssue>
        </Journal>
        <ArticleTitle>Gut microbiota in IBD patients</ArticleTitle>
        <Abstract>
          <AbstractText>We profiled fecal samples from 120 patients.</AbstractText>
          <AbstractText>16S rRNA sequencing revealed genus-level shifts.</AbstractText>
        </Abstract>
        <AuthorList>
          <Author>
            <LastName>Smith</LastName>
            <ForeName>Jane</ForeName>
          </Author>
          <Author>
            <CollectiveName>IBD Consortium</CollectiveName>
          </Author>
        </AuthorList>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_pubmed_article() {
        let pmid = Pmid::new("34845010").unwrap();
        let record = parse_pubmed_article(ARTICLE_XML, &pmid).unwrap();

        assert_eq!(record.pmid, pmid);
        assert_eq!(record.title, "Gut microbiota in IBD patients");
        assert_eq!(record.journal, "Gut Microbes");
        assert_eq!(record.publication_date, "2021");
        assert_eq!(record.authors, vec!["Jane Smith", "IBD Consortium"]);
        assert!(record.r#abstract.starts_with("We profiled fecal samples"));
        assert!(record.r#abstract.contains("genus-level shifts"));
        assert!(!record.has_full_text);
        assert!(record.full_text.is_empty());
    }

    #[test]
    fn test_parse_empty_article_set_is_not_found() {
        let pmid = Pmid::new("99999999").unwrap();
        let result = parse_pubmed_article("<PubmedArticleSet></PubmedArticleSet>", &pmid);
        assert!(matches!(result, Err(RetrievalError::NotFound(_))));
    }

    #[test]
    fn test_parse_elink_direct_link() {
        let xml = r#"<eLinkResult>
  <LinkSet>
    <LinkSetDb>
      <DbTo>pmc</DbTo>
      <LinkName>pubmed_pmc_refs</LinkName>
      <Link><Id>111</Id></Link>
    </LinkSetDb>
    <LinkSetDb>
      <DbTo>pmc</DbTo>
      <LinkName>pubmed_pmc</LinkName>
      <Link><Id>8675309</Id></Link>
    </LinkSetDb>
  </LinkSet>
</eLinkResult>"#;
        assert_eq!(parse_elink_pmc_id(xml).unwrap(), Some("8675309".into()));
    }

    #[test]
    fn test_parse_elink_without_link() {
        let xml = "<eLinkResult><LinkSet></LinkSet></eLinkResult>";
        assert_eq!(parse_elink_pmc_id(xml).unwrap(), None);
    }

    #[test]
    fn test_parse_jats_body() {
        let xml = r#"<article>
  <front><article-meta><title-group><article-title>T</article-title></title-group></article-meta></front>
  <body>
    <sec>
      <title>Methods</title>
      <p>We recruited <italic>n</italic> = 120 participants.</p>
      <p>Stool samples underwent 16S rRNA sequencing.</p>
    </sec>
  </body>
</article>"#;
        let text = parse_jats_body(xml);
        assert!(text.contains("120 participants"));
        assert!(text.contains("16S rRNA sequencing"));
    }

    #[test]
    fn test_parse_jats_without_body_is_empty() {
        assert_eq!(parse_jats_body("<article><front/></article>"), "");
        assert_eq!(parse_jats_body("not xml at all"), "");
    }

    #[test]
    fn test_build_url_includes_politeness_params() {
        let config = RetrievalConfig::default();
        let client = EutilsClient::new(&config, Some("secret-key".into()));
        let url = client.build_url("efetch.fcgi", &[("db", "pubmed"), ("id", "12345")]);

        assert!(url.starts_with(EUTILS_BASE_URL));
        assert!(url.contains("db=pubmed"));
        assert!(url.contains("id=12345"));
        assert!(url.contains("api_key=secret-key"));
        assert!(url.contains("tool=bioanalyzer"));
        assert!(url.contains("email="));
    }
}
