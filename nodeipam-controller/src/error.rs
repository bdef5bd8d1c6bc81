use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("kube error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("kube utils error: {0}")]
    KubeUtils(#[from] nodeipam_k8s_utils::Error),

    #[error("crd error: {0}")]
    Crd(#[from] nodeipam_crds::Error),

    #[error("error fetching networks: {0}")]
    NetworkList(String),

    #[error("error fetching parameters {name}: {reason}")]
    NetworkParameters { name: String, reason: String },

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("node {0} doesn't have a provider id")]
    MissingProviderId(String),

    #[error("failed to allocate cidr: node {0} has no cidrs on the default network")]
    NoDefaultCidrs(String),

    #[error("invalid ip network: {0}")]
    InvalidIPNetwork(#[from] ipnetwork::IpNetworkError),

    #[error("invalid cidr set: {0}")]
    InvalidCidrSet(String),

    #[error("cloud error: {0}")]
    Cloud(String),

    #[error(transparent)]
    JsonConversion(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    YamlConversion(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("unable to queue node due to channel error")]
    ChannelError,

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::KubeError(_) | Error::KubeUtils(_) => "kube",
            Error::Crd(_) | Error::JsonConversion(_) | Error::YamlConversion(_) => "encoding",
            Error::NetworkList(_) | Error::NetworkParameters { .. } => "networks",
            Error::ResourceNotFound(_) => "not_found",
            Error::MissingProviderId(_) => "missing_provider_id",
            Error::NoDefaultCidrs(_) => "no_cidrs",
            Error::InvalidIPNetwork(_) | Error::InvalidCidrSet(_) => "invalid_cidr",
            Error::Cloud(_) | Error::IoError(_) => "cloud",
            Error::ChannelError => "channel",
            Error::Other(_) => "other",
        }
    }
}
