//! Form-handling views.
//!
//! [`FormView`] binds a [`Form`] to a [`View`]. On `POST` the form receives
//! the decoded body. Rendering then depends on the [`FormOutcome`]: the
//! initial page, the same page again with errors, or a redirect / success
//! page.

use std::collections::BTreeMap;

use async_trait::async_trait;
use http::Method;

use crate::error::Error;
use crate::request::FormData;
use crate::response::Response;
use crate::view::{Respond, View};

/// Validation errors keyed by field name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// A form bound to submitted data.
#[async_trait]
pub trait Form: Send {
    /// Binds `data` and validates it. Field problems belong in
    /// [`errors`](Form::errors). An `Err` here aborts the request.
    async fn post(&mut self, data: &FormData) -> Result<(), Error>;

    /// Field errors from the last [`post`](Form::post).
    fn errors(&self) -> &FieldErrors;
}

/// Which way a form request went.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormOutcome {
    /// Nothing was posted; show the form.
    Unsubmitted,
    /// The form reported errors; show it again with them.
    Invalid,
    /// The form accepted the data.
    Valid,
}

/// A [`View`] that processes a [`Form`].
///
/// ```rust,ignore
/// async fn signup(view: View) -> Result<Response, Error> {
///     FormView::new(view, SignupForm::default())
///         .with_redirect_url("/welcome")
///         .respond(Context::new())
///         .await
/// }
/// ```
pub struct FormView<F> {
    view: View,
    form: F,
    submitted: bool,
    redirect_url: Option<String>,
    success_template: Option<String>,
}

impl<F: Form> FormView<F> {
    pub fn new(view: View, form: F) -> Self {
        Self { view, form, submitted: false, redirect_url: None, success_template: None }
    }

    /// After a valid submission, answer with `302 Found` to `url`.
    pub fn with_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = Some(url.into());
        self
    }

    /// After a valid submission, render `name` instead of the form template.
    /// Ignored when a redirect URL is set.
    pub fn with_success_template(mut self, name: impl Into<String>) -> Self {
        self.success_template = Some(name.into());
        self
    }

    pub fn form(&self) -> &F { &self.form }
    pub fn form_mut(&mut self) -> &mut F { &mut self.form }
    pub fn redirect_url(&self) -> Option<&str> { self.redirect_url.as_deref() }
    pub fn success_template(&self) -> Option<&str> { self.success_template.as_deref() }

    pub fn outcome(&self) -> FormOutcome {
        if !self.submitted {
            FormOutcome::Unsubmitted
        } else if self.form.errors().is_empty() {
            FormOutcome::Valid
        } else {
            FormOutcome::Invalid
        }
    }

    fn render_outcome(&mut self, outcome: FormOutcome) -> Result<Response, Error> {
        match outcome {
            FormOutcome::Unsubmitted => {}
            FormOutcome::Invalid => {
                let errors = self.form.errors().clone();
                self.view.context_mut().insert_serialize("errors", &errors)?;
            }
            FormOutcome::Valid => {
                if let Some(url) = &self.redirect_url {
                    return Ok(Response::redirect(url));
                }
                if let Some(name) = &self.success_template {
                    self.view.set_template(name.clone());
                }
            }
        }
        self.view.render()
    }
}

#[async_trait]
impl<F: Form> Respond for FormView<F> {
    fn view(&self) -> &View { &self.view }
    fn view_mut(&mut self) -> &mut View { &mut self.view }

    async fn handle_request(&mut self) -> Result<(), Error> {
        if self.view.request().method() != Method::POST {
            return Ok(());
        }
        let data = self.view.request().post()?;
        self.form.post(&data).await?;
        self.submitted = true;
        Ok(())
    }

    async fn handle_success(&mut self) -> Result<Response, Error> {
        let outcome = self.outcome();
        self.render_outcome(outcome)
    }
}
