//! A small site: a page with a header fragment, a contact form and static
//! assets.
//!
//! Run from the crate root with:
//!   RUST_LOG=tsu_page=debug cargo run --example site
//!
//! Try:
//!   curl http://localhost:3000/
//!   curl -d email= http://localhost:3000/contact
//!   curl -i -d email=ada@example.com http://localhost:3000/contact
//!   curl http://localhost:3000/static/site.css

use std::sync::Arc;

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;
use tsu_page::{
    Context, Error, FieldErrors, Form, FormData, FormView, Fragment, Request, Respond, Router,
    Server, StaticFiles, Template, Templates, View, ViewDispatcher,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let templates = Arc::new(Templates::from_dir("demos/templates"));

    let header = Arc::new(
        Fragment::with_template("header.html", templates.clone())?
            .wrap(|_req| async { Context::from_iter([("site", "tsu-page")]) }),
    );

    let index = Template::new("index.html", templates.clone())?.wrap({
        let header = Arc::clone(&header);
        move |req: Request| {
            let header = Arc::clone(&header);
            async move {
                let mut ctx = Context::from_iter([("title", "Home")]);
                ctx.insert("header", (*header)(req).await?);
                Ok::<_, Error>(ctx)
            }
        }
    });

    let contact_page = move |view: View| {
        let header = Arc::clone(&header);
        async move {
            let mut extra = Context::from_iter([("title", "Contact")]);
            extra.insert("header", (*header)(view.request().clone()).await?);
            FormView::new(view, ContactForm::default())
                .with_success_template("thanks.html")
                .respond(extra)
                .await
        }
    };
    let contact = ViewDispatcher::new("contact.html", templates)?;

    let app = Router::new()
        .get("/", index)
        .get("/contact", contact.clone().wrap(contact_page.clone()))
        .post("/contact", contact.wrap(contact_page))
        .get("/static/{*path}", StaticFiles::new().handler("demos/static", "path"));

    Server::bind("0.0.0.0:3000")?.serve(app).await
}

// POST /contact
//
// A missing or malformed email re-renders contact.html with `errors`.
#[derive(Default)]
struct ContactForm {
    errors: FieldErrors,
}

#[async_trait]
impl Form for ContactForm {
    async fn post(&mut self, data: &FormData) -> Result<(), Error> {
        let email = data.get("email").unwrap_or_default().trim();
        if email.is_empty() {
            self.errors.insert("email".into(), vec!["required".into()]);
        } else if !email.contains('@') {
            self.errors.insert("email".into(), vec!["not an email address".into()]);
        }
        Ok(())
    }

    fn errors(&self) -> &FieldErrors {
        &self.errors
    }
}
