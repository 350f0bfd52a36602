//! Attendance submission flow.
//!
//! ```text
//! Idle -> CapturingSelfie -> Ready -> Submitting -> Success
//!                                              \-> Failed -> (retry) Submitting
//! ```
//!
//! The camera is held only while capturing and is released on every way out
//! of that state.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};

use crate::{
    error::{AppError, Result},
    models::{
        attendance::{AttendanceForm, AttendanceSubmission},
        link::{AttendanceLink, INVALID_LINK_MESSAGE},
    },
    services::attendance::AttendanceSink,
};

pub const SELFIE_REQUIRED_MESSAGE: &str = "Please take a selfie first";
pub const SUCCESS_MESSAGE: &str = "Attendance recorded successfully!";
pub const SUBMIT_FAILED_MESSAGE: &str = "Failed to submit attendance";

/// An acquired camera feed.
pub trait CameraStream {
    /// Grabs one still frame as encoded image bytes.
    fn capture(&mut self) -> Result<Vec<u8>>;
    /// Stops every track of the feed.
    fn release(&mut self);
}

/// A device that can be opened for a selfie.
pub trait Camera {
    type Stream: CameraStream;

    /// Acquires the device. `AppError::Permission` means the user refused.
    fn open(&mut self) -> Result<Self::Stream>;
}

/// A "camera" that yields a still image from disk.
#[derive(Debug, Clone)]
pub struct FileCamera {
    path: PathBuf,
}

impl FileCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Camera for FileCamera {
    type Stream = FileCameraStream;

    fn open(&mut self) -> Result<FileCameraStream> {
        match std::fs::File::open(&self.path) {
            Ok(_) => Ok(FileCameraStream {
                path: self.path.clone(),
                active: true,
            }),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(AppError::Permission(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
            Err(e) => Err(AppError::Camera(format!("{}: {}", self.path.display(), e))),
        }
    }
}

pub struct FileCameraStream {
    path: PathBuf,
    active: bool,
}

impl CameraStream for FileCameraStream {
    fn capture(&mut self) -> Result<Vec<u8>> {
        if !self.active {
            return Err(AppError::Camera("camera already released".to_string()));
        }
        std::fs::read(&self.path).map_err(|e| AppError::Camera(format!("{}: {}", self.path.display(), e)))
    }

    fn release(&mut self) {
        if self.active {
            self.active = false;
            tracing::debug!("Released camera {}", self.path.display());
        }
    }
}

/// Encodes a captured frame as a `data:<mime>;base64,...` URI.
///
/// Frames that are not a recognisable image are rejected.
pub fn encode_selfie(frame: &[u8]) -> Result<String> {
    let kind = infer::get(frame)
        .filter(|k| k.matcher_type() == infer::MatcherType::Image)
        .ok_or_else(|| AppError::Camera("captured frame is not an image".to_string()))?;
    Ok(format!(
        "data:{};base64,{}",
        kind.mime_type(),
        general_purpose::STANDARD.encode(frame)
    ))
}

/// Where the flow currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    CapturingSelfie,
    Ready,
    Submitting,
    Success,
    Failed(String),
}

/// One page load of the attendance form.
pub struct SubmissionFlow<C: Camera> {
    link: Option<AttendanceLink>,
    blocked: Option<String>,
    form: AttendanceForm,
    camera: C,
    stream: Option<C::Stream>,
    selfie: Option<String>,
    state: FlowState,
    error: Option<String>,
    device_info: String,
}

impl<C: Camera> SubmissionFlow<C> {
    /// Mounts the form for an incoming URL, checking its session once.
    ///
    /// A missing parameter or a lapsed session leaves the flow blocked with
    /// the reason as its error; nothing can be submitted afterwards.
    pub fn open(raw_url: &str, camera: C, device_info: String, now: DateTime<Utc>) -> Self {
        let (link, blocked) = match AttendanceLink::parse(raw_url) {
            Ok(link) => match link.ensure_live(now) {
                Ok(()) => (Some(link), None),
                Err(e) => (None, Some(e.user_message())),
            },
            Err(e) => (None, Some(e.user_message())),
        };

        if let Some(ref msg) = blocked {
            tracing::warn!("Attendance form blocked: {}", msg);
        }

        Self {
            link,
            blocked,
            form: AttendanceForm::default(),
            camera,
            stream: None,
            selfie: None,
            state: FlowState::Idle,
            error: None,
            device_info,
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// The user-visible error, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref().or(self.blocked.as_deref())
    }

    pub fn selfie(&self) -> Option<&str> {
        self.selfie.as_deref()
    }

    pub fn form(&self) -> &AttendanceForm {
        &self.form
    }

    /// Whether the URL check failed at mount time.
    pub fn is_blocked(&self) -> bool {
        self.blocked.is_some()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.link.as_ref().map(|l| l.session_id.as_str())
    }

    /// Sets one form field by its wire name.
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        let slot = match name {
            "full_name" => &mut self.form.full_name,
            "phone_number" => &mut self.form.phone_number,
            "email" => &mut self.form.email,
            "branch" => &mut self.form.branch,
            "section" => &mut self.form.section,
            "roll_number" => &mut self.form.roll_number,
            other => return Err(AppError::Validation(format!("Unknown field: {}", other))),
        };
        *slot = value.into();
        if matches!(self.state, FlowState::Failed(_)) {
            self.state = FlowState::Ready;
        }
        Ok(())
    }

    /// Replaces the whole form.
    pub fn fill(&mut self, form: AttendanceForm) {
        self.form = form;
        if matches!(self.state, FlowState::Failed(_)) {
            self.state = FlowState::Ready;
        }
    }

    /// `Idle -> CapturingSelfie`, or back to `Idle` with a message on failure.
    pub fn open_camera(&mut self) -> Result<()> {
        if let Some(ref reason) = self.blocked {
            return Err(AppError::Validation(reason.clone()));
        }
        if matches!(self.state, FlowState::Submitting | FlowState::Success) {
            return Err(AppError::Validation("The form can no longer be changed".to_string()));
        }
        self.release_camera();
        self.selfie = None;
        self.error = None;

        match self.camera.open() {
            Ok(stream) => {
                self.stream = Some(stream);
                self.state = FlowState::CapturingSelfie;
                tracing::debug!("Camera opened");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Camera unavailable: {}", e);
                self.state = FlowState::Idle;
                self.error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// `CapturingSelfie -> Ready`. The feed is released whatever happens.
    pub fn capture_selfie(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Err(AppError::Validation("Open the camera first".to_string()));
        };

        let captured = stream.capture().and_then(|frame| encode_selfie(&frame));
        stream.release();

        match captured {
            Ok(selfie) => {
                self.selfie = Some(selfie);
                self.state = FlowState::Ready;
                self.error = None;
                tracing::info!("Selfie captured");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Selfie capture failed: {}", e);
                self.state = FlowState::Idle;
                self.error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Leaves `CapturingSelfie` without a picture.
    pub fn cancel_camera(&mut self) {
        if self.release_camera() {
            self.state = FlowState::Idle;
        }
    }

    /// Drops the current selfie and opens the camera again.
    pub fn retake_selfie(&mut self) -> Result<()> {
        self.open_camera()
    }

    /// Whether `submit` would pass its local checks.
    pub fn can_submit(&self) -> bool {
        self.precondition().is_ok()
    }

    fn precondition(&self) -> Result<String> {
        if let Some(ref reason) = self.blocked {
            return Err(AppError::Validation(reason.clone()));
        }
        let Some(link) = self.link.as_ref() else {
            return Err(AppError::Validation(INVALID_LINK_MESSAGE.to_string()));
        };
        match self.state {
            FlowState::Submitting => {
                return Err(AppError::Validation("Submission already in progress".to_string()));
            }
            FlowState::Success => {
                return Err(AppError::Validation("Attendance already recorded".to_string()));
            }
            _ => {}
        }
        if self.selfie.is_none() {
            return Err(AppError::Validation(SELFIE_REQUIRED_MESSAGE.to_string()));
        }
        self.form.check()?;
        Ok(link.session_id.clone())
    }

    /// `Ready -> Submitting -> Success | Failed`.
    ///
    /// Local checks run first; when they fail no request is made.
    pub async fn submit<S: AttendanceSink>(&mut self, sink: &S) -> Result<String> {
        let session_id = match self.precondition() {
            Ok(session_id) => session_id,
            Err(e) => {
                self.error = Some(e.user_message());
                return Err(e);
            }
        };

        let payload = AttendanceSubmission::new(
            &self.form,
            &session_id,
            self.device_info.clone(),
            self.selfie.clone().unwrap_or_default(),
        );

        self.state = FlowState::Submitting;
        self.error = None;

        match sink.submit(&payload).await {
            Ok(receipt) => {
                self.state = FlowState::Success;
                tracing::info!("{}", SUCCESS_MESSAGE);
                Ok(receipt)
            }
            Err(e) => {
                let msg = e.user_message_or(SUBMIT_FAILED_MESSAGE);
                self.state = FlowState::Failed(msg.clone());
                self.error = Some(msg);
                Err(e)
            }
        }
    }

    /// Waits out the success message, then discards the submitted data.
    ///
    /// Returns `false` without waiting when the flow has not succeeded.
    pub async fn leave_after(&mut self, delay: Duration) -> bool {
        if self.state != FlowState::Success {
            return false;
        }
        tokio::time::sleep(delay).await;
        self.form = AttendanceForm::default();
        self.selfie = None;
        true
    }

    fn release_camera(&mut self) -> bool {
        match self.stream.take() {
            Some(mut stream) => {
                stream.release();
                true
            }
            None => false,
        }
    }
}

impl<C: Camera> Drop for SubmissionFlow<C> {
    fn drop(&mut self) {
        self.release_camera();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];

    #[derive(Clone, Copy)]
    enum Behaviour {
        Works,
        Denied,
        Broken,
        BadFrame,
    }

    #[derive(Clone)]
    struct FakeCamera {
        behaviour: Behaviour,
        live_streams: Arc<AtomicU32>,
    }

    impl FakeCamera {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                live_streams: Arc::new(AtomicU32::new(0)),
            }
        }

        fn live(&self) -> u32 {
            self.live_streams.load(Ordering::SeqCst)
        }
    }

    struct FakeStream {
        behaviour: Behaviour,
        live_streams: Arc<AtomicU32>,
        released: bool,
    }

    impl Camera for FakeCamera {
        type Stream = FakeStream;

        fn open(&mut self) -> Result<FakeStream> {
            match self.behaviour {
                Behaviour::Denied => Err(AppError::Permission("NotAllowedError".into())),
                Behaviour::Broken => Err(AppError::Camera("NotReadableError".into())),
                b => {
                    self.live_streams.fetch_add(1, Ordering::SeqCst);
                    Ok(FakeStream {
                        behaviour: b,
                        live_streams: self.live_streams.clone(),
                        released: false,
                    })
                }
            }
        }
    }

    impl CameraStream for FakeStream {
        fn capture(&mut self) -> Result<Vec<u8>> {
            match self.behaviour {
                Behaviour::BadFrame => Ok(vec![0, 1, 2, 3]),
                _ => Ok(JPEG.to_vec()),
            }
        }

        fn release(&mut self) {
            if !self.released {
                self.released = true;
                self.live_streams.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: AtomicU32,
        reject_with: Option<String>,
        last: Mutex<Option<AttendanceSubmission>>,
    }

    impl AttendanceSink for RecordingSink {
        fn submit(&self, payload: &AttendanceSubmission) -> impl Future<Output = Result<String>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(payload.clone());
            let outcome = match &self.reject_with {
                Some(detail) => Err(AppError::Server {
                    status: 400,
                    message: detail.clone(),
                }),
                None => Ok(r#"{"status":"ok"}"#.to_string()),
            };
            async move { outcome }
        }
    }

    fn live_url() -> String {
        let expiry = (Utc::now() + chrono::Duration::seconds(60)).to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        format!("https://attend.example.edu/attendance?sessionId=abc&expiryTime={}", expiry)
    }

    fn filled(flow: &mut SubmissionFlow<FakeCamera>) {
        flow.fill(AttendanceForm {
            full_name: "Asha Verma".into(),
            phone_number: "9876543210".into(),
            email: "asha@example.edu".into(),
            branch: "CSE".into(),
            section: "B".into(),
            roll_number: "21CS042".into(),
        });
    }

    fn flow(camera: FakeCamera) -> SubmissionFlow<FakeCamera> {
        SubmissionFlow::open(&live_url(), camera, "test-device".into(), Utc::now())
    }

    #[test]
    fn jpeg_frames_become_data_uris() {
        let uri = encode_selfie(JPEG).unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,"));
        assert!(encode_selfie(b"plain text").is_err());
    }

    #[test]
    fn capture_releases_the_camera() {
        let camera = FakeCamera::new(Behaviour::Works);
        let mut flow = flow(camera.clone());

        flow.open_camera().unwrap();
        assert_eq!(flow.state(), &FlowState::CapturingSelfie);
        assert_eq!(camera.live(), 1);

        flow.capture_selfie().unwrap();
        assert_eq!(flow.state(), &FlowState::Ready);
        assert_eq!(camera.live(), 0);
        assert!(flow.selfie().unwrap().starts_with("data:image/jpeg"));
    }

    #[test]
    fn cancel_and_drop_release_the_camera() {
        let camera = FakeCamera::new(Behaviour::Works);
        let mut f = flow(camera.clone());
        f.open_camera().unwrap();
        f.cancel_camera();
        assert_eq!(f.state(), &FlowState::Idle);
        assert_eq!(camera.live(), 0);

        f.open_camera().unwrap();
        assert_eq!(camera.live(), 1);
        drop(f);
        assert_eq!(camera.live(), 0);
    }

    #[test]
    fn bad_frame_releases_and_returns_to_idle() {
        let camera = FakeCamera::new(Behaviour::BadFrame);
        let mut f = flow(camera.clone());
        f.open_camera().unwrap();
        assert!(f.capture_selfie().is_err());
        assert_eq!(f.state(), &FlowState::Idle);
        assert_eq!(camera.live(), 0);
        assert_eq!(f.error(), Some("Failed to access camera. Please try again."));
    }

    #[test]
    fn denied_permission_is_distinguished() {
        let mut f = flow(FakeCamera::new(Behaviour::Denied));
        assert!(matches!(f.open_camera(), Err(AppError::Permission(_))));
        assert_eq!(f.state(), &FlowState::Idle);
        assert_eq!(f.error(), Some("Please allow camera access when prompted"));

        let mut f = flow(FakeCamera::new(Behaviour::Broken));
        assert!(f.open_camera().is_err());
        assert_eq!(f.error(), Some("Failed to access camera. Please try again."));
    }

    #[tokio::test]
    async fn submit_without_selfie_makes_no_request() {
        let sink = RecordingSink::default();
        let mut f = flow(FakeCamera::new(Behaviour::Works));
        filled(&mut f);

        assert!(!f.can_submit());
        assert!(f.submit(&sink).await.is_err());
        assert_eq!(f.error(), Some(SELFIE_REQUIRED_MESSAGE));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn submit_with_blank_field_makes_no_request() {
        let sink = RecordingSink::default();
        let mut f = flow(FakeCamera::new(Behaviour::Works));
        filled(&mut f);
        f.set_field("section", "").unwrap();
        f.open_camera().unwrap();
        f.capture_selfie().unwrap();

        assert!(!f.can_submit());
        assert!(f.submit(&sink).await.is_err());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);

        f.set_field("section", "B").unwrap();
        assert!(f.can_submit());
    }

    #[tokio::test]
    async fn successful_submit_sends_everything_once() {
        let sink = RecordingSink::default();
        let mut f = flow(FakeCamera::new(Behaviour::Works));
        filled(&mut f);
        f.open_camera().unwrap();
        f.capture_selfie().unwrap();

        f.submit(&sink).await.unwrap();
        assert_eq!(f.state(), &FlowState::Success);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);

        let sent = sink.last.lock().unwrap().clone().unwrap();
        assert_eq!(sent.session_id, "abc");
        assert_eq!(sent.device_info, "test-device");
        assert!(sent.selfie_data.starts_with("data:image/jpeg;base64,"));

        assert!(f.submit(&sink).await.is_err());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_detail_fails_the_attempt_and_allows_retry() {
        let sink = RecordingSink {
            reject_with: Some("Attendance already marked for this session".into()),
            ..Default::default()
        };
        let mut f = flow(FakeCamera::new(Behaviour::Works));
        filled(&mut f);
        f.open_camera().unwrap();
        f.capture_selfie().unwrap();

        assert!(f.submit(&sink).await.is_err());
        assert_eq!(
            f.state(),
            &FlowState::Failed("Attendance already marked for this session".into())
        );
        assert_eq!(f.error(), Some("Attendance already marked for this session"));
        assert!(f.can_submit());

        f.set_field("roll_number", "21CS043").unwrap();
        assert_eq!(f.state(), &FlowState::Ready);
    }

    struct SilentFailureSink;

    impl AttendanceSink for SilentFailureSink {
        fn submit(&self, _: &AttendanceSubmission) -> impl Future<Output = Result<String>> + Send {
            async { Err(AppError::Network(String::new())) }
        }
    }

    #[tokio::test]
    async fn failure_without_detail_reads_as_submission_failure() {
        let mut f = flow(FakeCamera::new(Behaviour::Works));
        filled(&mut f);
        f.open_camera().unwrap();
        f.capture_selfie().unwrap();

        assert!(f.submit(&SilentFailureSink).await.is_err());
        assert_eq!(f.state(), &FlowState::Failed(SUBMIT_FAILED_MESSAGE.into()));
        assert_eq!(f.error(), Some(SUBMIT_FAILED_MESSAGE));
    }

    #[tokio::test]
    async fn expired_link_blocks_the_form() {
        let expiry = (Utc::now() - chrono::Duration::seconds(5)).to_rfc3339();
        let url = format!("https://attend.example.edu/?sessionId=abc&expiryTime={}", expiry.replace('+', "%2B"));
        let sink = RecordingSink::default();
        let mut f = SubmissionFlow::open(&url, FakeCamera::new(Behaviour::Works), "d".into(), Utc::now());

        assert!(f.is_blocked());
        assert_eq!(f.error(), Some(crate::models::link::EXPIRED_LINK_MESSAGE));
        filled(&mut f);
        assert!(f.open_camera().is_err());
        assert!(!f.can_submit());
        assert!(f.submit(&sink).await.is_err());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_after_success_discards_the_payload() {
        let sink = RecordingSink::default();
        let mut f = flow(FakeCamera::new(Behaviour::Works));
        filled(&mut f);
        f.open_camera().unwrap();
        f.capture_selfie().unwrap();
        f.submit(&sink).await.unwrap();

        let start = tokio::time::Instant::now();
        assert!(f.leave_after(Duration::from_secs(2)).await);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert!(f.selfie().is_none());
        assert_eq!(f.form(), &AttendanceForm::default());
    }
}
