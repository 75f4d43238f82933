//! AWS EventBridge Scheduler implementation
//!
//! Each job becomes a one-shot `at()` schedule targeting the worker Lambda
//! with the drop event as input. Schedules delete themselves after firing.

use super::{ScheduleInfo, SchedulerBackend, SchedulerError, SchedulerResult, schedule_name};
use chrono::{DateTime, NaiveDateTime, Utc};
use cierge_types::{DropEvent, Sealed};
use uuid::Uuid;

const AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// AWS EventBridge Scheduler configuration
#[derive(Debug, Clone)]
pub struct AwsEventBridgeConfig {
    /// ARN of the worker Lambda to invoke
    pub target_arn: String,
    /// ARN of the IAM role the scheduler assumes
    pub role_arn: String,
    /// Schedule group name (defaults to "cierge")
    pub group_name: String,
}

impl AwsEventBridgeConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, SchedulerError> {
        Ok(Self {
            target_arn: std::env::var("CIERGE_SCHEDULER_WORKER_TARGET").map_err(|_| {
                SchedulerError::ConfigError("CIERGE_SCHEDULER_WORKER_TARGET not set".into())
            })?,
            role_arn: std::env::var("CIERGE_SCHEDULER_ROLE")
                .map_err(|_| SchedulerError::ConfigError("CIERGE_SCHEDULER_ROLE not set".into()))?,
            group_name: std::env::var("CIERGE_SCHEDULER_GROUP")
                .unwrap_or_else(|_| "cierge".to_string()),
        })
    }
}

/// One-shot schedule expression, always evaluated in UTC.
pub fn at_expression(fire_at: DateTime<Utc>) -> String {
    format!("at({})", fire_at.format(AT_FORMAT))
}

pub fn parse_at_expression(expression: &str) -> SchedulerResult<DateTime<Utc>> {
    let inner = expression
        .strip_prefix("at(")
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| SchedulerError::ProviderError(format!("not an at() expression: {}", expression)))?;
    NaiveDateTime::parse_from_str(inner, AT_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| SchedulerError::ProviderError(format!("bad at() expression: {}", e)))
}

/// AWS EventBridge Scheduler implementation
#[cfg(feature = "aws")]
pub struct AwsEventBridgeScheduler {
    config: AwsEventBridgeConfig,
    client: aws_sdk_scheduler::Client,
}

#[cfg(not(feature = "aws"))]
pub struct AwsEventBridgeScheduler {
    config: AwsEventBridgeConfig,
}

#[cfg(feature = "aws")]
impl AwsEventBridgeScheduler {
    /// Create a new scheduler from environment variables
    pub async fn from_env() -> SchedulerResult<Self> {
        let config = AwsEventBridgeConfig::from_env()?;
        Ok(Self::new(config).await)
    }

    /// Create a new scheduler with explicit configuration
    pub async fn new(config: AwsEventBridgeConfig) -> Self {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = aws_sdk_scheduler::Client::new(&aws_config);
        Self { config, client }
    }

    fn target(&self, event: &DropEvent) -> SchedulerResult<aws_sdk_scheduler::types::Target> {
        let input = event
            .to_json()
            .map_err(|e| SchedulerError::InvalidEvent(e.to_string()))?;
        aws_sdk_scheduler::types::Target::builder()
            .arn(&self.config.target_arn)
            .role_arn(&self.config.role_arn)
            .input(input)
            .build()
            .map_err(|e| SchedulerError::ProviderError(format!("Failed to build target: {}", e)))
    }

    fn time_window() -> SchedulerResult<aws_sdk_scheduler::types::FlexibleTimeWindow> {
        use aws_sdk_scheduler::types::{FlexibleTimeWindow, FlexibleTimeWindowMode};

        FlexibleTimeWindow::builder()
            .mode(FlexibleTimeWindowMode::Off)
            .build()
            .map_err(|e| SchedulerError::ProviderError(format!("Failed to build time window: {}", e)))
    }
}

#[cfg(not(feature = "aws"))]
impl AwsEventBridgeScheduler {
    /// Create a new scheduler (stub without AWS SDK)
    pub async fn from_env() -> SchedulerResult<Self> {
        Ok(Self {
            config: AwsEventBridgeConfig::from_env()?,
        })
    }

    /// Create a new scheduler with explicit configuration
    pub async fn new(config: AwsEventBridgeConfig) -> Self {
        Self { config }
    }
}

#[cfg(feature = "aws")]
#[async_trait::async_trait]
impl SchedulerBackend for AwsEventBridgeScheduler {
    async fn schedule(&self, event: &DropEvent, fire_at: DateTime<Utc>) -> SchedulerResult<()> {
        use aws_sdk_scheduler::types::{ActionAfterCompletion, ScheduleState};

        super::traits::validate(event, fire_at)?;
        let name = schedule_name(event.job_id);
        let expression = at_expression(fire_at);

        let result = self
            .client
            .create_schedule()
            .name(&name)
            .group_name(&self.config.group_name)
            .schedule_expression(&expression)
            .schedule_expression_timezone("UTC")
            .state(ScheduleState::Enabled)
            .action_after_completion(ActionAfterCompletion::Delete)
            .flexible_time_window(Self::time_window()?)
            .target(self.target(event)?)
            .send()
            .await;

        if let Err(e) = result {
            if e.as_service_error().is_some_and(|se| se.is_conflict_exception()) {
                return Err(SchedulerError::AlreadyExists(name));
            }
            return Err(SchedulerError::ProviderError(format!("AWS SDK error: {}", e)));
        }

        tracing::info!(
            job_id = %event.job_id,
            schedule_name = %name,
            expression = %expression,
            "Created EventBridge schedule"
        );
        Ok(())
    }

    async fn cancel(&self, job_id: Uuid) -> SchedulerResult<()> {
        let name = schedule_name(job_id);

        match self
            .client
            .delete_schedule()
            .name(&name)
            .group_name(&self.config.group_name)
            .send()
            .await
        {
            Ok(_) => {
                tracing::info!(job_id = %job_id, "Deleted EventBridge schedule");
                Ok(())
            }
            Err(e) if e.as_service_error().is_some_and(|se| se.is_resource_not_found_exception()) => {
                tracing::debug!(job_id = %job_id, "Schedule already deleted");
                Ok(())
            }
            Err(e) => Err(SchedulerError::ProviderError(format!("AWS SDK error: {}", e))),
        }
    }

    async fn update_credentials(&self, job_id: Uuid, encrypted_token: Sealed) -> SchedulerResult<()> {
        use aws_sdk_scheduler::types::{ActionAfterCompletion, ScheduleState};

        let mut info = self
            .get(job_id)
            .await?
            .ok_or_else(|| SchedulerError::NotFound(job_id.to_string()))?;
        info.event.encrypted_token = encrypted_token;

        self.client
            .update_schedule()
            .name(schedule_name(job_id))
            .group_name(&self.config.group_name)
            .schedule_expression(at_expression(info.fire_at))
            .schedule_expression_timezone("UTC")
            .state(ScheduleState::Enabled)
            .action_after_completion(ActionAfterCompletion::Delete)
            .flexible_time_window(Self::time_window()?)
            .target(self.target(&info.event)?)
            .send()
            .await
            .map_err(|e| SchedulerError::ProviderError(format!("AWS SDK error: {}", e)))?;

        tracing::info!(job_id = %job_id, "Updated credentials of EventBridge schedule");
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> SchedulerResult<Option<ScheduleInfo>> {
        let response = match self
            .client
            .get_schedule()
            .name(schedule_name(job_id))
            .group_name(&self.config.group_name)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_resource_not_found_exception()) => {
                return Ok(None);
            }
            Err(e) => return Err(SchedulerError::ProviderError(format!("AWS SDK error: {}", e))),
        };

        let expression = response
            .schedule_expression
            .ok_or_else(|| SchedulerError::ProviderError("Schedule has no expression".to_string()))?;
        let input = response
            .target
            .and_then(|t| t.input)
            .ok_or_else(|| SchedulerError::ProviderError("Schedule has no target input".to_string()))?;
        let event = DropEvent::from_json(&input)
            .map_err(|e| SchedulerError::ProviderError(format!("Schedule input is not a drop event: {}", e)))?;

        Ok(Some(ScheduleInfo {
            job_id,
            fire_at: parse_at_expression(&expression)?,
            event,
        }))
    }
}

// Stub implementation when AWS feature is disabled
#[cfg(not(feature = "aws"))]
#[async_trait::async_trait]
impl SchedulerBackend for AwsEventBridgeScheduler {
    async fn schedule(&self, event: &DropEvent, fire_at: DateTime<Utc>) -> SchedulerResult<()> {
        tracing::warn!(
            job_id = %event.job_id,
            expression = %at_expression(fire_at),
            group = %self.config.group_name,
            "AWS feature not enabled - schedule not created"
        );
        Err(SchedulerError::ConfigError(
            "AWS feature not enabled. Compile with --features aws".into(),
        ))
    }

    async fn cancel(&self, job_id: Uuid) -> SchedulerResult<()> {
        tracing::warn!(job_id = %job_id, "AWS feature not enabled");
        Err(SchedulerError::ConfigError("AWS feature not enabled".into()))
    }

    async fn update_credentials(&self, job_id: Uuid, _encrypted_token: Sealed) -> SchedulerResult<()> {
        tracing::warn!(job_id = %job_id, "AWS feature not enabled");
        Err(SchedulerError::ConfigError("AWS feature not enabled".into()))
    }

    async fn get(&self, _job_id: Uuid) -> SchedulerResult<Option<ScheduleInfo>> {
        Err(SchedulerError::ConfigError("AWS feature not enabled".into()))
    }
}
