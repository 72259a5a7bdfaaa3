use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArticleMetrics {
    pub title: String,
    pub layout_ms: f64,
    pub flowable_count: usize,
    pub failed: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LayoutMetrics {
    pub articles: Vec<ArticleMetrics>,
    pub failed_articles: usize,
    pub flowable_count: usize,
    pub warnings: usize,
    pub total_layout_ms: f64,
    /// The first build attempt failed and the document was re-rendered in fail-safe mode.
    pub fail_safe: bool,
}

impl LayoutMetrics {
    pub fn record_article(&mut self, article: ArticleMetrics) {
        if article.failed {
            self.failed_articles += 1;
        }
        self.total_layout_ms += article.layout_ms;
        self.articles.push(article);
    }
}
