pub type ViewerResult<T> = Result<T, ViewerError>;

#[derive(thiserror::Error, Debug)]
pub enum ViewerError {
    #[error("invalid viewer configuration: {0}")]
    Config(String),
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },
    #[error("failed to open document: {0}")]
    DocumentOpen(String),
    #[error("fetch failed for page {page}")]
    PageFetch {
        page: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("render failed for page {page}")]
    PageRender {
        page: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("document source worker is gone")]
    SourceGone,
}

impl From<std::io::Error> for ViewerError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            context: "I/O operation failed".to_string(),
        }
    }
}

impl ViewerError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn io_with_context(source: std::io::Error, context: impl Into<String>) -> Self {
        Self::Io {
            source,
            context: context.into(),
        }
    }

    pub fn document_open(message: impl Into<String>) -> Self {
        Self::DocumentOpen(message.into())
    }

    pub fn page_fetch(page: usize, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::PageFetch {
            page,
            source: Box::new(source),
        }
    }

    pub fn page_render(
        page: usize,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::PageRender {
            page,
            source: Box::new(source),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
