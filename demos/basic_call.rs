//! Basic example: GET and POST calls with URL templates and hooks.
//!
//! This example shows how to:
//! - Configure a client from a JSON properties document
//! - Fill URL placeholders from path variables and query parameters
//! - Unwrap an API envelope with a response hook
//! - Inspect response metadata
//!
//! Run with: `cargo run --example basic_call`

use serde::{Deserialize, Serialize};
use servicekit::hooks::RestHooks;
use servicekit::uri::Params;
use servicekit::{Error, RestClient, RestProperties};

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

/// Tags every request with the calling application.
struct DemoHooks;

impl RestHooks for DemoHooks {
    fn append_header(&self) -> Vec<(String, String)> {
        vec![("x-caller".to_string(), "basic-call-demo".to_string())]
    }

    fn accept(&self) -> Option<String> {
        Some("application/json".to_string())
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("servicekit=debug,basic_call=info")
        .init();

    let properties = RestProperties::from_json(
        r#"{
            "connect-timeout": 3000,
            "read-timeout": 10000,
            "conn-pool": { "max-conn-total": 20, "default-conn-per-route": 5 },
            "log-time-format": "%Y-%m-%d %H:%M:%S%.3f"
        }"#,
    )?;

    let client = RestClient::builder()
        .properties(properties)
        .hooks(DemoHooks)
        .build()?;

    println!("=== GET Request Example ===");
    let response = client
        .get_with::<Vec<Post>>(
            "https://jsonplaceholder.typicode.com/users/{user}/posts",
            Params::new().add("_limit", 2),
            Some(Params::new().add("user", 1)),
        )
        .await?;

    for post in response.iter() {
        println!("Post {}: {}", post.id, post.title);
    }
    println!("Request latency: {:?}", response.latency);
    println!("Keep-alive: {:?}", response.keep_alive);
    println!();

    println!("=== POST Request Example ===");
    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };

    let created = client
        .post_entity::<_, Post>("https://jsonplaceholder.typicode.com/posts", &new_post)
        .await?;

    println!("Created post with ID: {}", created.data.id);
    println!("Status code: {}", created.status);

    Ok(())
}
