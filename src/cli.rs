use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};

use crate::commands;
use crate::config::Config;
use crate::response::StandardResponse;
use crate::session::SessionManager;

/// webauto: Playwright-based browser automation with a JSON CLI surface
#[derive(Parser, Debug)]
#[command(name = "webauto")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (sets RUST_LOG=debug unless already set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch a browser instance and return a session ID
    BrowserLaunch {
        /// Browser type (chromium|firefox|webkit)
        #[arg(long, env = "DEFAULT_BROWSER_TYPE", default_value = "chromium")]
        browser_type: String,

        /// Headless mode
        #[arg(long, action = ArgAction::SetTrue)]
        headless: bool,

        /// Disable headless mode (visible browser)
        #[arg(long, action = ArgAction::SetTrue, conflicts_with = "headless")]
        no_headless: bool,

        /// Viewport width
        #[arg(long, env = "DEFAULT_VIEWPORT_WIDTH", default_value_t = 1920)]
        viewport_width: u32,

        /// Viewport height
        #[arg(long, env = "DEFAULT_VIEWPORT_HEIGHT", default_value_t = 1080)]
        viewport_height: u32,

        /// User-Agent override
        #[arg(long, default_value = "")]
        user_agent: String,

        /// Session ID (optional, auto-generated if not provided)
        #[arg(long)]
        session_id: Option<String>,
    },

    /// Close a browser session
    BrowserClose {
        /// Session ID to close (required)
        #[arg(long)]
        session_id: String,
    },

    /// Close a browser session (identical to browser-close)
    SessionClose {
        /// Session ID to close (required)
        #[arg(long)]
        session_id: String,
    },

    /// List all browser sessions, active and persisted
    SessionList,

    /// Navigate to a URL in an existing browser session
    PageNavigate {
        /// Session ID (required)
        #[arg(long)]
        session_id: String,

        /// URL to navigate to (required)
        #[arg(long)]
        page_url: String,

        /// When to consider navigation successful (load|domcontentloaded|networkidle)
        #[arg(long, default_value = "load")]
        wait_until: String,

        /// Navigation timeout in milliseconds
        #[arg(long, default_value_t = 30000)]
        timeout: u64,
    },

    /// Execute custom JavaScript in the page context
    PageEvaluate {
        /// Session ID (required)
        #[arg(long)]
        session_id: String,

        /// JavaScript code to execute (required)
        #[arg(long)]
        script: String,

        /// Execution timeout in milliseconds
        #[arg(long, default_value_t = 30000)]
        timeout_ms: u64,
    },

    /// Take a screenshot of the current page
    PageScreenshot {
        /// Session ID (required)
        #[arg(long)]
        session_id: String,

        /// Output image file path
        #[arg(long, default_value = "screenshot.png")]
        image_path: String,

        /// Screenshot type (png|jpeg)
        #[arg(long = "type", default_value = "png")]
        image_type: String,

        /// Capture the full scrollable page
        #[arg(long, action = ArgAction::SetTrue)]
        full_page: bool,

        /// Screenshot timeout in milliseconds
        #[arg(long, default_value_t = 30000)]
        timeout: u64,
    },

    /// Save the current page as PDF
    PagePdf {
        /// Session ID (required)
        #[arg(long)]
        session_id: String,

        /// Output PDF file path
        #[arg(long, default_value = "page.pdf")]
        pdf_path: String,

        /// PDF page format (A4|Letter|Legal)
        #[arg(long, default_value = "A4")]
        pdf_format: String,

        /// Landscape orientation
        #[arg(long, action = ArgAction::SetTrue)]
        landscape: bool,

        /// Print background graphics
        #[arg(
            long,
            default_value_t = true,
            action = ArgAction::Set,
            num_args = 0..=1,
            default_missing_value = "true"
        )]
        print_background: bool,

        /// PDF generation timeout in milliseconds
        #[arg(long, default_value_t = 30000)]
        timeout: u64,
    },

    /// Get HTML source from the page or an element
    PageGetHtml {
        /// Session ID (required)
        #[arg(long)]
        session_id: String,

        /// CSS selector or XPath (optional, omit for full page)
        #[arg(long)]
        element_selector: Option<String>,

        /// Output file path (optional, omit to return HTML in JSON)
        #[arg(long)]
        output_path: Option<String>,

        /// Timeout in milliseconds
        #[arg(long, default_value_t = 30000)]
        timeout_ms: u64,
    },

    /// Click an element on the page
    ElementClick {
        /// Session ID (required)
        #[arg(long)]
        session_id: String,

        /// CSS selector for the element (required)
        #[arg(long)]
        element_selector: String,

        /// Click timeout in milliseconds
        #[arg(long, default_value_t = 30000)]
        timeout: u64,
    },

    /// Type text into an element on the page
    ElementType {
        /// Session ID (required)
        #[arg(long)]
        session_id: String,

        /// CSS selector for the element (required)
        #[arg(long)]
        element_selector: String,

        /// Text to type (required)
        #[arg(long)]
        element_text: String,

        /// Type timeout in milliseconds
        #[arg(long, default_value_t = 30000)]
        timeout: u64,
    },

    /// Get text content from an element
    ElementGetText {
        /// Session ID (required)
        #[arg(long)]
        session_id: String,

        /// CSS selector or XPath (required)
        #[arg(long)]
        element_selector: String,

        /// Timeout in milliseconds
        #[arg(long, default_value_t = 30000)]
        timeout_ms: u64,
    },

    /// Get an attribute value from an element
    ElementGetAttribute {
        /// Session ID (required)
        #[arg(long)]
        session_id: String,

        /// CSS selector or XPath (required)
        #[arg(long)]
        element_selector: String,

        /// Attribute name to extract (required)
        #[arg(long)]
        attribute_name: String,

        /// Timeout in milliseconds
        #[arg(long, default_value_t = 30000)]
        timeout_ms: u64,
    },

    /// Wait for an element to meet a condition
    ElementWait {
        /// Session ID (required)
        #[arg(long)]
        session_id: String,

        /// CSS selector or XPath (required)
        #[arg(long)]
        element_selector: String,

        /// Wait condition: visible, hidden, attached, detached
        #[arg(long = "wait-for", default_value = "visible")]
        wait_condition: String,

        /// Timeout in milliseconds
        #[arg(long, default_value_t = 30000)]
        timeout_ms: u64,
    },

    /// Query multiple elements and extract data in batch
    ElementQueryAll {
        /// Session ID (required)
        #[arg(long)]
        session_id: String,

        /// CSS selector or XPath (required)
        #[arg(long)]
        element_selector: String,

        /// Extract text content from each element
        #[arg(long, action = ArgAction::SetTrue)]
        get_text: bool,

        /// Attribute name to extract (href, src, class, etc.)
        #[arg(long = "get-attribute")]
        attribute_name: Option<String>,

        /// Maximum number of elements to process (0 = all elements)
        #[arg(long, default_value_t = 0)]
        limit: u64,

        /// Timeout in milliseconds
        #[arg(long, default_value_t = 30000)]
        timeout_ms: u64,
    },

    /// Fill multiple form fields at once
    FormFill {
        /// Session ID (required)
        #[arg(long)]
        session_id: String,

        /// JSON object with selector:value pairs (required)
        #[arg(long)]
        form_data: String,

        /// Submit the form after filling
        #[arg(long, action = ArgAction::SetTrue)]
        submit: bool,

        /// CSS selector for the submit button (required with --submit)
        #[arg(long)]
        submit_selector: Option<String>,

        /// Timeout for each field in milliseconds
        #[arg(long, default_value_t = 30000)]
        timeout: u64,
    },
}

impl Cli {
    pub async fn run(self, config: &Config, manager: Arc<SessionManager>) -> ExitCode {
        let response = self.dispatch(config, &manager).await;
        response.print();
        if response.success {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }

    async fn dispatch(self, config: &Config, manager: &SessionManager) -> StandardResponse {
        match self.command {
            Commands::BrowserLaunch {
                browser_type,
                headless,
                no_headless,
                viewport_width,
                viewport_height,
                user_agent,
                session_id,
            } => {
                let effective_headless = if no_headless {
                    false
                } else if headless {
                    true
                } else {
                    config.default_headless
                };
                commands::browser::launch(
                    manager,
                    commands::browser::LaunchArgs {
                        browser_type,
                        headless: effective_headless,
                        viewport_width,
                        viewport_height,
                        user_agent,
                        session_id,
                    },
                )
                .await
            }

            Commands::BrowserClose { session_id } | Commands::SessionClose { session_id } => {
                commands::browser::close(manager, &session_id).await
            }

            Commands::SessionList => commands::session::list(manager).await,

            Commands::PageNavigate {
                session_id,
                page_url,
                wait_until,
                timeout,
            } => {
                commands::page::navigate(manager, &session_id, &page_url, &wait_until, timeout)
                    .await
            }

            Commands::PageEvaluate {
                session_id,
                script,
                timeout_ms,
            } => commands::page::evaluate(manager, &session_id, &script, timeout_ms).await,

            Commands::PageScreenshot {
                session_id,
                image_path,
                image_type,
                full_page,
                timeout,
            } => {
                commands::page::screenshot(
                    manager,
                    &session_id,
                    &image_path,
                    &image_type,
                    full_page,
                    timeout,
                )
                .await
            }

            Commands::PagePdf {
                session_id,
                pdf_path,
                pdf_format,
                landscape,
                print_background,
                timeout,
            } => {
                commands::page::pdf(
                    manager,
                    &session_id,
                    &pdf_path,
                    &pdf_format,
                    landscape,
                    print_background,
                    timeout,
                )
                .await
            }

            Commands::PageGetHtml {
                session_id,
                element_selector,
                output_path,
                timeout_ms,
            } => {
                commands::page::get_html(
                    manager,
                    &session_id,
                    element_selector.as_deref(),
                    output_path.as_deref(),
                    timeout_ms,
                )
                .await
            }

            Commands::ElementClick {
                session_id,
                element_selector,
                timeout,
            } => commands::element::click(manager, &session_id, &element_selector, timeout).await,

            Commands::ElementType {
                session_id,
                element_selector,
                element_text,
                timeout,
            } => {
                commands::element::type_text(
                    manager,
                    &session_id,
                    &element_selector,
                    &element_text,
                    timeout,
                )
                .await
            }

            Commands::ElementGetText {
                session_id,
                element_selector,
                timeout_ms,
            } => {
                commands::element::get_text(manager, &session_id, &element_selector, timeout_ms)
                    .await
            }

            Commands::ElementGetAttribute {
                session_id,
                element_selector,
                attribute_name,
                timeout_ms,
            } => {
                commands::element::get_attribute(
                    manager,
                    &session_id,
                    &element_selector,
                    &attribute_name,
                    timeout_ms,
                )
                .await
            }

            Commands::ElementWait {
                session_id,
                element_selector,
                wait_condition,
                timeout_ms,
            } => {
                commands::element::wait(
                    manager,
                    &session_id,
                    &element_selector,
                    &wait_condition,
                    timeout_ms,
                )
                .await
            }

            Commands::ElementQueryAll {
                session_id,
                element_selector,
                get_text,
                attribute_name,
                limit,
                timeout_ms,
            } => {
                commands::element::query_all(
                    manager,
                    &session_id,
                    &element_selector,
                    get_text,
                    attribute_name.as_deref(),
                    limit,
                    timeout_ms,
                )
                .await
            }

            Commands::FormFill {
                session_id,
                form_data,
                submit,
                submit_selector,
                timeout,
            } => {
                commands::form::fill(
                    manager,
                    &session_id,
                    &form_data,
                    submit,
                    submit_selector.as_deref(),
                    timeout,
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbs_use_kebab_case_names() {
        let cmd = Cli::command();
        let names: Vec<_> = cmd.get_subcommands().map(|c| c.get_name()).collect();
        for expected in [
            "browser-launch",
            "browser-close",
            "session-close",
            "session-list",
            "page-navigate",
            "page-evaluate",
            "page-screenshot",
            "page-pdf",
            "page-get-html",
            "element-click",
            "element-type",
            "element-get-text",
            "element-get-attribute",
            "element-wait",
            "element-query-all",
            "form-fill",
        ] {
            assert!(names.contains(&expected), "missing subcommand {expected}");
        }
    }

    #[test]
    fn browser_launch_flags_parse() {
        let cli = Cli::try_parse_from([
            "webauto",
            "browser-launch",
            "--browser-type",
            "firefox",
            "--no-headless",
            "--viewport-width",
            "1280",
            "--session-id",
            "ses_11aa22bb",
        ])
        .unwrap();

        match cli.command {
            Commands::BrowserLaunch {
                browser_type,
                no_headless,
                viewport_width,
                session_id,
                ..
            } => {
                assert_eq!(browser_type, "firefox");
                assert!(no_headless);
                assert_eq!(viewport_width, 1280);
                assert_eq!(session_id.as_deref(), Some("ses_11aa22bb"));
            }
            _ => panic!("parsed into the wrong subcommand"),
        }
    }

    #[test]
    fn headless_conflicts_with_no_headless() {
        let err = Cli::try_parse_from([
            "webauto",
            "browser-launch",
            "--headless",
            "--no-headless",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn query_all_attribute_flag_is_named_get_attribute() {
        let cli = Cli::try_parse_from([
            "webauto",
            "element-query-all",
            "--session-id",
            "ses_00000001",
            "--element-selector",
            "a.link",
            "--get-attribute",
            "href",
            "--limit",
            "5",
        ])
        .unwrap();

        match cli.command {
            Commands::ElementQueryAll {
                attribute_name,
                limit,
                get_text,
                ..
            } => {
                assert_eq!(attribute_name.as_deref(), Some("href"));
                assert_eq!(limit, 5);
                assert!(!get_text);
            }
            _ => panic!("parsed into the wrong subcommand"),
        }
    }
}
