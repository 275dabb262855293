//! End-to-end pipeline tests against a mocked E-utilities server.

use std::sync::Arc;

use mockito::{Matcher, Server, ServerGuard};

use bioanalyzer::config::{BatchConfig, CacheConfig, RetrievalConfig};
use bioanalyzer::extract::{MockFieldModel, PaperAnalyzer};
use bioanalyzer::models::{BatchError, Pmid};
use bioanalyzer::retrieval::EutilsClient;
use bioanalyzer::utils::MemoryCache;
use bioanalyzer::{BatchProcessor, Pipeline};
use std::time::Duration;

fn article_xml(pmid: &str, title: &str, r#abstract: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">{pmid}</PMID>
      <Article>
        <Journal>
          <Title>Gut Microbes</Title>
          <JournalIssue><PubDate><Year>2024</Year></PubDate></JournalIssue>
        </Journal>
        <ArticleTitle>{title}</ArticleTitle>
        <Abstract><AbstractText>{abstract}</AbstractText></Abstract>
        <AuthorList>
          <Author><LastName>Doe</LastName><ForeName>Jay</ForeName></Author>
        </AuthorList>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#,
        pmid = pmid,
        title = title,
        r#abstract = r#abstract,
    )
}

const EMPTY_ARTICLE_SET: &str = r#"<?xml version="1.0"?><PubmedArticleSet></PubmedArticleSet>"#;
const EMPTY_ELINK: &str = "<eLinkResult><LinkSet></LinkSet></eLinkResult>";

fn test_retrieval_config() -> RetrievalConfig {
    RetrievalConfig {
        min_request_interval_ms: 0,
        max_attempts: 1,
        backoff_base_ms: 1,
        backoff_factor: 2.0,
        backoff_max_ms: 10,
        attempt_timeout_secs: 5,
        email: "tests@example.com".to_string(),
    }
}

fn pipeline_for(server: &ServerGuard) -> Pipeline {
    let client =
        EutilsClient::new(&test_retrieval_config(), None).with_base_url(server.url());
    let analyzer = PaperAnalyzer::new(
        Arc::new(MockFieldModel::new()),
        0.5,
        Duration::from_secs(1),
    );
    let cache = MemoryCache::from_config(&CacheConfig {
        enabled: true,
        record_ttl_secs: 300,
        analysis_ttl_secs: 300,
    });
    Pipeline::new(client, analyzer, cache)
}

fn efetch_query(pmid: &str) -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("db".into(), "pubmed".into()),
        Matcher::UrlEncoded("id".into(), pmid.into()),
    ])
}

#[tokio::test]
async fn test_cached_fetch_hits_upstream_once() {
    let mut server = Server::new_async().await;

    let efetch = server
        .mock("GET", "/efetch.fcgi")
        .match_query(efetch_query("11111"))
        .with_body(article_xml(
            "11111",
            "Fecal microbiota in IBD",
            "16S rRNA sequencing of stool from 40 human patients.",
        ))
        .expect(1)
        .create_async()
        .await;
    let elink = server
        .mock("GET", "/elink.fcgi")
        .match_query(Matcher::UrlEncoded("dbfrom".into(), "pubmed".into()))
        .with_body(EMPTY_ELINK)
        .expect(1)
        .create_async()
        .await;

    let pipeline = pipeline_for(&server);
    let pmid = Pmid::new("11111").unwrap();

    let first = pipeline.fetch_paper(&pmid).await.unwrap();
    let second = pipeline.fetch_paper(&pmid).await.unwrap();

    assert_eq!(first.title, "Fecal microbiota in IBD");
    assert_eq!(second.title, first.title);
    assert_eq!(second.retrieved_at, first.retrieved_at); // served from cache

    efetch.assert_async().await;
    elink.assert_async().await;
}

#[tokio::test]
async fn test_full_text_attached_when_pmc_deposit_exists() {
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/efetch.fcgi")
        .match_query(efetch_query("55555"))
        .with_body(article_xml("55555", "Oral microbiome study", "Saliva samples."))
        .create_async()
        .await;
    server
        .mock("GET", "/elink.fcgi")
        .match_query(Matcher::UrlEncoded("dbfrom".into(), "pubmed".into()))
        .with_body(
            r#"<eLinkResult><LinkSet><LinkSetDb>
                 <DbTo>pmc</DbTo><LinkName>pubmed_pmc</LinkName>
                 <Link><Id>7777777</Id></Link>
               </LinkSetDb></LinkSet></eLinkResult>"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", "/efetch.fcgi")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("db".into(), "pmc".into()),
            Matcher::UrlEncoded("id".into(), "7777777".into()),
        ]))
        .with_body(
            "<article><body><sec><p>We sequenced saliva from 30 participants.</p></sec></body></article>",
        )
        .create_async()
        .await;

    let pipeline = pipeline_for(&server);
    let record = pipeline
        .fetch_paper(&Pmid::new("55555").unwrap())
        .await
        .unwrap();

    assert!(record.has_full_text);
    assert!(record.full_text.contains("30 participants"));
    assert_eq!(record.analysis_text(), record.full_text);
}

#[tokio::test]
async fn test_batch_preserves_order_dedups_and_isolates_failures() {
    let mut server = Server::new_async().await;

    // 11111 and 33333 resolve; 22222 does not exist upstream.
    for (pmid, title) in [
        ("11111", "Gut microbiota in obesity"),
        ("33333", "Skin microbiome of mice"),
    ] {
        server
            .mock("GET", "/efetch.fcgi")
            .match_query(efetch_query(pmid))
            .with_body(article_xml(
                pmid,
                title,
                "Shotgun metagenomics, n = 60 human participants, fecal samples.",
            ))
            .expect(1) // deduplication: one upstream fetch per unique PMID
            .create_async()
            .await;
    }
    server
        .mock("GET", "/efetch.fcgi")
        .match_query(efetch_query("22222"))
        .with_body(EMPTY_ARTICLE_SET)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", "/elink.fcgi")
        .match_query(Matcher::UrlEncoded("dbfrom".into(), "pubmed".into()))
        .with_body(EMPTY_ELINK)
        .expect(2) // only the two resolvable papers reach elink
        .create_async()
        .await;

    let pipeline = Arc::new(pipeline_for(&server));
    let processor = BatchProcessor::new(
        pipeline,
        BatchConfig {
            max_concurrent: 3,
            timeout_secs: None,
        },
    );

    let inputs = vec![
        "11111".to_string(),
        "22222".to_string(),
        "11111".to_string(),
        "bogus".to_string(),
        "33333".to_string(),
    ];
    let outcome = processor.process(&inputs).await;

    assert_eq!(outcome.items.len(), 5);
    let order: Vec<&str> = outcome.items.iter().map(|i| i.pmid.as_str()).collect();
    assert_eq!(order, vec!["11111", "22222", "11111", "bogus", "33333"]);

    // Failures isolated to their own slots.
    assert!(outcome.items[0].is_ok());
    assert!(matches!(
        outcome.items[1].error,
        Some(BatchError::Retrieval(_))
    ));
    assert!(outcome.items[2].is_ok());
    assert!(matches!(
        outcome.items[3].error,
        Some(BatchError::InvalidPmid(_))
    ));
    assert!(outcome.items[4].is_ok());

    // Duplicate inputs share one analysis.
    let first = serde_json::to_value(outcome.items[0].analysis.as_ref().unwrap()).unwrap();
    let third = serde_json::to_value(outcome.items[2].analysis.as_ref().unwrap()).unwrap();
    assert_eq!(first, third);

    assert_eq!(outcome.succeeded(), 3);
    assert_eq!(outcome.failed(), 2);
    let error_positions: Vec<usize> = outcome.errors().iter().map(|(i, _, _)| *i).collect();
    assert_eq!(error_positions, vec![1, 3]);
}

#[tokio::test]
async fn test_analysis_uses_fallback_when_model_unavailable() {
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/efetch.fcgi")
        .match_query(efetch_query("44444"))
        .with_body(article_xml(
            "44444",
            "Vaginal microbiome and probiotics",
            "Vaginal swabs from 25 participants underwent 16S rRNA sequencing \
             at genus level in this probiotic trial.",
        ))
        .create_async()
        .await;
    server
        .mock("GET", "/elink.fcgi")
        .match_query(Matcher::UrlEncoded("dbfrom".into(), "pubmed".into()))
        .with_body(EMPTY_ELINK)
        .create_async()
        .await;

    let pipeline = pipeline_for(&server);
    let analysis = pipeline
        .analyze_paper(&Pmid::new("44444").unwrap())
        .await
        .unwrap();

    use bioanalyzer::models::CurationField;
    assert_eq!(
        analysis.fields[&CurationField::BodySite].value.as_deref(),
        Some("Vaginal")
    );
    assert_eq!(
        analysis.fields[&CurationField::SampleSize].value.as_deref(),
        Some("25")
    );
    assert_eq!(
        analysis.fields[&CurationField::SequencingType]
            .value
            .as_deref(),
        Some("16S rRNA amplicon sequencing")
    );
    assert_eq!(analysis.fields.len(), 6);
}

#[tokio::test]
async fn test_rate_limit_response_parses_retry_after_and_is_retried() {
    let mut server = Server::new_async().await;

    let mut config = test_retrieval_config();
    config.max_attempts = 2;

    let limited = server
        .mock("GET", "/efetch.fcgi")
        .match_query(efetch_query("77777"))
        .with_status(429)
        .with_header("Retry-After", "0")
        .expect(2) // transient: initial attempt plus one retry
        .create_async()
        .await;

    let client = EutilsClient::new(&config, None).with_base_url(server.url());
    let result = client.fetch_metadata(&Pmid::new("77777").unwrap()).await;

    // The header value survives into the error, so the retry loop sleeps the
    // server-suggested delay instead of the backoff formula.
    assert!(matches!(
        result,
        Err(bioanalyzer::RetrievalError::RateLimited {
            retry_after: Some(0)
        })
    ));
    limited.assert_async().await;
}

#[tokio::test]
async fn test_batch_timeout_marks_unfinished_slots_cancelled() {
    // A bound listener that never accepts: requests connect but hang, so the
    // batch deadline always fires first.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = test_retrieval_config();
    config.attempt_timeout_secs = 30;
    let client = EutilsClient::new(&config, None).with_base_url(format!("http://{addr}"));
    let analyzer = PaperAnalyzer::new(
        Arc::new(MockFieldModel::new()),
        0.5,
        Duration::from_secs(1),
    );
    let pipeline = Arc::new(Pipeline::new(client, analyzer, MemoryCache::disabled()));

    let processor = BatchProcessor::new(
        pipeline,
        BatchConfig {
            max_concurrent: 2,
            timeout_secs: Some(0),
        },
    );
    let outcome = processor
        .process(&["11111".to_string(), "22222".to_string()])
        .await;

    assert_eq!(outcome.items.len(), 2);
    for item in &outcome.items {
        assert_eq!(item.error, Some(BatchError::Cancelled), "{}", item.pmid);
    }
    drop(listener);
}

#[tokio::test]
async fn test_server_error_surfaces_after_retries() {
    let mut server = Server::new_async().await;

    let mut config = test_retrieval_config();
    config.max_attempts = 2;

    server
        .mock("GET", "/efetch.fcgi")
        .match_query(efetch_query("66666"))
        .with_status(503)
        .expect(2) // initial attempt plus one retry
        .create_async()
        .await;

    let client = EutilsClient::new(&config, None).with_base_url(server.url());
    let analyzer = PaperAnalyzer::new(
        Arc::new(MockFieldModel::new()),
        0.5,
        Duration::from_secs(1),
    );
    let pipeline = Pipeline::new(client, analyzer, MemoryCache::disabled());

    let result = pipeline.fetch_paper(&Pmid::new("66666").unwrap()).await;
    assert!(matches!(
        result,
        Err(bioanalyzer::RetrievalError::Status(503))
    ));
}
