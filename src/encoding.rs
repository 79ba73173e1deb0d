//! Remote job definition: what an encoding of one batch job looks like.
//!
//! Shared resources (input, output, codec configurations) are created once per
//! run by [`EncodingTemplate::prepare`]. Each job's encoding, with one stream
//! and one fMP4 muxing per [`Rendition`], is created lazily by
//! [`EncodingJobClient`] on the job's first start attempt.

use tracing::{debug, info, warn};

use crate::batch::JobSpec;
use crate::config::BatchConfig;
use crate::platform::types::{
    AacAudioConfiguration, AclEntry, AclPermission, Encoding, EncodingOutput, Fmp4Muxing,
    H264VideoConfiguration, HttpInput, MuxingStream, PresetConfiguration, S3Output, Stream,
    StreamInput, StreamSelectionMode,
};
use crate::platform::{
    PlatformClient, PlatformError, RemoteJobClient, RemoteStatus, StatusReport,
};

/// Folder under the output base path that receives all batch output.
pub const OUTPUT_FOLDER: &str = "batch-encoding";

pub const SEGMENT_LENGTH_SECS: f64 = 4.0;

/// One output rendition of every encoding in the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendition {
    Video { height: u32, bitrate: u64 },
    Audio { bitrate: u64 },
}

impl Rendition {
    /// H.264 480p/720p/1080p plus AAC 128 kbit/s.
    pub fn default_ladder() -> Vec<Rendition> {
        vec![
            Rendition::Video {
                height: 480,
                bitrate: 800_000,
            },
            Rendition::Video {
                height: 720,
                bitrate: 1_200_000,
            },
            Rendition::Video {
                height: 1080,
                bitrate: 2_000_000,
            },
            Rendition::Audio { bitrate: 128_000 },
        ]
    }

    /// Where this rendition's segments go, relative to the output folder.
    pub fn muxing_path(&self, job_output_path: &str) -> String {
        let job_output_path = job_output_path.trim_end_matches('/');
        match self {
            Rendition::Video { height, .. } => format!("{job_output_path}/video/{height}"),
            Rendition::Audio { bitrate } => format!("{job_output_path}/audio/{}", bitrate / 1000),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Rendition::Video { height, .. } => format!("H.264 {height}"),
            Rendition::Audio { bitrate } => format!("AAC {} kbit/s", bitrate / 1000),
        }
    }
}

/// `<base path>batch-encoding/<relative path>`; `base_path` is already normalized.
pub fn absolute_output_path(base_path: &str, relative_path: &str) -> String {
    format!(
        "{base_path}{OUTPUT_FOLDER}/{}",
        relative_path.trim_start_matches('/')
    )
}

#[derive(Debug, Clone)]
pub struct PreparedRendition {
    pub rendition: Rendition,
    pub codec_config_id: String,
}

/// Remote resources shared by every encoding of the run.
#[derive(Debug, Clone)]
pub struct EncodingTemplate {
    pub input_id: String,
    pub output_id: String,
    pub base_path: String,
    pub renditions: Vec<PreparedRendition>,
}

impl EncodingTemplate {
    pub async fn prepare(
        client: &PlatformClient,
        config: &BatchConfig,
        renditions: &[Rendition],
    ) -> Result<Self, PlatformError> {
        let input = client
            .create_http_input(&HttpInput {
                id: None,
                host: config.input.host.clone(),
            })
            .await?;
        let output = client
            .create_s3_output(&S3Output {
                id: None,
                bucket_name: config.output.bucket_name.clone(),
                access_key: config.output.access_key.clone(),
                secret_key: config.output.secret_key.clone(),
            })
            .await?;

        let mut prepared = Vec::with_capacity(renditions.len());
        for rendition in renditions {
            let codec_config_id = match *rendition {
                Rendition::Video { height, bitrate } => {
                    client
                        .create_h264_configuration(&H264VideoConfiguration {
                            id: None,
                            name: rendition.name(),
                            preset_configuration: PresetConfiguration::VodStandard,
                            height,
                            bitrate,
                        })
                        .await?
                        .id
                }
                Rendition::Audio { bitrate } => {
                    client
                        .create_aac_configuration(&AacAudioConfiguration {
                            id: None,
                            name: rendition.name(),
                            bitrate,
                        })
                        .await?
                        .id
                }
            };
            prepared.push(PreparedRendition {
                rendition: *rendition,
                codec_config_id: require_id(codec_config_id, "codec configuration")?,
            });
        }

        let template = Self {
            input_id: require_id(input.id, "HTTP input")?,
            output_id: require_id(output.id, "S3 output")?,
            base_path: config.output.base_path.clone(),
            renditions: prepared,
        };
        info!(
            input_id = %template.input_id,
            output_id = %template.output_id,
            renditions = template.renditions.len(),
            "Prepared encoding template"
        );
        Ok(template)
    }
}

fn require_id(id: Option<String>, what: &str) -> Result<String, PlatformError> {
    id.ok_or_else(|| PlatformError::UnexpectedResponse(format!("created {what} has no id")))
}

/// [`RemoteJobClient`] backed by the platform's REST API.
pub struct EncodingJobClient {
    client: PlatformClient,
    template: EncodingTemplate,
}

impl EncodingJobClient {
    pub fn new(client: PlatformClient, template: EncodingTemplate) -> Self {
        Self { client, template }
    }

    /// One stream and one fMP4 muxing per rendition of the template.
    async fn add_renditions(&self, encoding_id: &str, spec: &JobSpec) -> Result<(), PlatformError> {
        for prepared in &self.template.renditions {
            let stream = self
                .client
                .create_stream(
                    encoding_id,
                    &Stream {
                        id: None,
                        input_streams: vec![StreamInput {
                            input_id: self.template.input_id.clone(),
                            input_path: spec.input_path.clone(),
                            selection_mode: StreamSelectionMode::Auto,
                        }],
                        codec_config_id: prepared.codec_config_id.clone(),
                    },
                )
                .await?;
            let stream_id = require_id(stream.id, "stream")?;

            let output_path = absolute_output_path(
                &self.template.base_path,
                &prepared.rendition.muxing_path(&spec.output_path),
            );
            self.client
                .create_fmp4_muxing(
                    encoding_id,
                    &Fmp4Muxing {
                        id: None,
                        segment_length: SEGMENT_LENGTH_SECS,
                        outputs: vec![EncodingOutput {
                            output_id: self.template.output_id.clone(),
                            output_path,
                            acl: vec![AclEntry {
                                permission: AclPermission::PublicRead,
                            }],
                        }],
                        streams: vec![MuxingStream { stream_id }],
                    },
                )
                .await?;
        }

        Ok(())
    }
}

impl RemoteJobClient for EncodingJobClient {
    async fn create_job(&self, spec: &JobSpec) -> Result<String, PlatformError> {
        let encoding = self
            .client
            .create_encoding(&Encoding {
                id: None,
                name: spec.name.clone(),
            })
            .await?;
        let encoding_id = require_id(encoding.id, "encoding")?;

        // A half-built encoding cannot be started; remove it before reporting the failure.
        if let Err(e) = self.add_renditions(&encoding_id, spec).await {
            match self.client.delete_encoding(&encoding_id).await {
                Ok(_) => debug!(job = %spec.name, %encoding_id, "Deleted incomplete encoding"),
                Err(delete_err) => warn!(
                    job = %spec.name,
                    %encoding_id,
                    "Could not delete incomplete encoding: {delete_err}"
                ),
            }
            return Err(e);
        }

        debug!(job = %spec.name, %encoding_id, "Created encoding");
        Ok(encoding_id)
    }

    async fn start_job(&self, job_id: &str) -> Result<(), PlatformError> {
        self.client.start_encoding(job_id).await.map(|_| ())
    }

    async fn job_status(&self, job_id: &str) -> Result<StatusReport, PlatformError> {
        self.client
            .encoding_status(job_id)
            .await
            .map(StatusReport::from)
    }

    async fn count_jobs_in_state(&self, status: RemoteStatus) -> Result<u64, PlatformError> {
        self.client.count_encodings(status).await
    }
}
