//! The single-page chat UI served at `GET /`.
//!
//! Plain HTML with inline CSS and JS talking to the `/api` endpoints; the
//! bearer token lives in `sessionStorage`.

pub const APP_TITLE: &str = "docchat";

pub fn render_index_page() -> String {
    INDEX_TEMPLATE.replace("{{TITLE}}", APP_TITLE)
}

const INDEX_TEMPLATE: &str = r##"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{{TITLE}}</title>
  <style>
    :root {
      color-scheme: light;
      font-family: "Inter", "Segoe UI", sans-serif;
    }
    body {
      margin: 0;
      background: #f3f5f8;
      color: #17212b;
    }
    .hidden { display: none !important; }
    .auth {
      max-width: 380px;
      margin: 8vh auto;
      background: #fff;
      border: 1px solid #d6dee6;
      border-radius: 12px;
      padding: 1.5rem;
    }
    .auth h1 { margin-top: 0; }
    label {
      display: block;
      font-size: 0.85rem;
      margin: 0.6rem 0 0.2rem;
      color: #3b5164;
    }
    input[type="text"], input[type="email"], input[type="password"], textarea {
      width: 100%;
      box-sizing: border-box;
      border: 1px solid #b9c8d5;
      border-radius: 8px;
      padding: 0.5rem 0.65rem;
      font: inherit;
    }
    button {
      border: 0;
      border-radius: 8px;
      padding: 0.5rem 0.9rem;
      background: #1f6feb;
      color: #fff;
      cursor: pointer;
      font: inherit;
    }
    button.secondary { background: #e4e9ef; color: #17212b; }
    button.danger { background: #d1242f; }
    .error { color: #d1242f; min-height: 1.2em; }
    .layout {
      display: grid;
      grid-template-columns: 280px 1fr;
      height: 100vh;
    }
    aside {
      background: #fff;
      border-right: 1px solid #d6dee6;
      padding: 1rem;
      overflow-y: auto;
    }
    aside h2 { font-size: 1rem; margin: 1.2rem 0 0.5rem; }
    .chat-item {
      display: flex;
      justify-content: space-between;
      padding: 0.35rem 0.5rem;
      border-radius: 6px;
      cursor: pointer;
    }
    .chat-item.active { background: #e6efff; }
    main {
      display: flex;
      flex-direction: column;
      height: 100vh;
    }
    #messages {
      flex: 1;
      overflow-y: auto;
      padding: 1rem 1.5rem;
    }
    .msg {
      max-width: 760px;
      margin: 0.5rem 0;
      padding: 0.7rem 0.9rem;
      border-radius: 10px;
      white-space: pre-wrap;
    }
    .msg.user { background: #1f6feb; color: #fff; margin-left: auto; }
    .msg.assistant { background: #fff; border: 1px solid #d6dee6; }
    .feedback button { margin-right: 0.3rem; padding: 0.2rem 0.5rem; }
    form.composer {
      display: flex;
      gap: 0.5rem;
      padding: 1rem 1.5rem;
      border-top: 1px solid #d6dee6;
      background: #fff;
    }
    table { width: 100%; border-collapse: collapse; font-size: 0.85rem; }
    td, th { border-bottom: 1px solid #e4e9ef; padding: 0.3rem; text-align: left; }
  </style>
</head>
<body>
  <section id="auth" class="auth">
    <h1>{{TITLE}}</h1>
    <p>Chat with your documents.</p>
    <label for="email">Email</label>
    <input id="email" type="email" autocomplete="username" />
    <label for="password">Password</label>
    <input id="password" type="password" autocomplete="current-password" />
    <div id="confirm-row" class="hidden">
      <label for="confirm">Confirm password</label>
      <input id="confirm" type="password" autocomplete="new-password" />
    </div>
    <label for="api-key">LLM API key (optional if the server has one)</label>
    <input id="api-key" type="password" />
    <p class="error" id="auth-error"></p>
    <button id="login-btn">Log in</button>
    <button id="register-btn" class="secondary">Register</button>
  </section>

  <div id="app" class="layout hidden">
    <aside>
      <div><strong id="who"></strong></div>
      <button id="logout-btn" class="secondary">Log out</button>

      <h2>Chats</h2>
      <div id="chat-list"></div>
      <input id="new-chat" type="text" placeholder="New chat name" />
      <button id="new-chat-btn">Create chat</button>

      <h2>Documents</h2>
      <input id="file" type="file" accept=".pdf,.docx,.csv,.txt,.html,.htm" />
      <button id="upload-btn">Upload</button>
      <p id="upload-status"></p>
      <button id="docs-btn" class="secondary">View documents</button>
      <button id="clear-btn" class="danger">Clear documents</button>

      <h2>History</h2>
      <button id="history-btn" class="secondary">View history</button>
      <button id="export-btn" class="secondary">Export CSV</button>
    </aside>
    <main>
      <div id="messages"></div>
      <form class="composer" id="composer">
        <textarea id="input" rows="2" placeholder="Ask about your documents..."></textarea>
        <button type="submit" id="send-btn">Send</button>
      </form>
    </main>
  </div>

  <script>
    const state = { token: sessionStorage.getItem("docchat_token"), email: sessionStorage.getItem("docchat_email"), chat: null };
    const $ = (id) => document.getElementById(id);

    async function api(method, path, body, raw) {
      const headers = {};
      if (state.token) headers["Authorization"] = "Bearer " + state.token;
      const opts = { method, headers };
      if (body instanceof FormData) {
        opts.body = body;
      } else if (body !== undefined) {
        headers["Content-Type"] = "application/json";
        opts.body = JSON.stringify(body);
      }
      const res = await fetch(path, opts);
      if (res.status === 401 && state.token) { signOut(); }
      if (!res.ok) {
        let message = res.statusText;
        try { message = (await res.json()).error.message; } catch (_) {}
        throw new Error(message);
      }
      if (raw) return res;
      if (res.status === 204) return null;
      return res.json();
    }

    function signIn(data) {
      state.token = data.token;
      state.email = data.email;
      sessionStorage.setItem("docchat_token", data.token);
      sessionStorage.setItem("docchat_email", data.email);
      showApp();
    }

    function signOut() {
      state.token = null;
      state.chat = null;
      sessionStorage.clear();
      $("app").classList.add("hidden");
      $("auth").classList.remove("hidden");
    }

    async function authenticate(kind) {
      $("auth-error").textContent = "";
      const payload = { email: $("email").value, password: $("password").value, api_key: $("api-key").value || null };
      if (kind === "register") {
        if ($("confirm-row").classList.contains("hidden")) {
          $("confirm-row").classList.remove("hidden");
          return;
        }
        payload.confirm_password = $("confirm").value;
      }
      try {
        signIn(await api("POST", "/api/" + kind, payload));
      } catch (e) {
        $("auth-error").textContent = e.message;
      }
    }

    async function showApp() {
      $("auth").classList.add("hidden");
      $("app").classList.remove("hidden");
      $("who").textContent = state.email;
      await loadChats();
    }

    async function loadChats() {
      const data = await api("GET", "/api/chats");
      const list = $("chat-list");
      list.innerHTML = "";
      if (!state.chat && data.chats.length) state.chat = data.chats[0].name;
      for (const chat of data.chats) {
        const item = document.createElement("div");
        item.className = "chat-item" + (chat.name === state.chat ? " active" : "");
        item.textContent = chat.name;
        item.onclick = () => { state.chat = chat.name; loadChats(); };
        const del = document.createElement("span");
        del.textContent = "✕";
        del.onclick = async (ev) => {
          ev.stopPropagation();
          await api("DELETE", "/api/chats/" + encodeURIComponent(chat.name));
          if (state.chat === chat.name) state.chat = null;
          loadChats();
        };
        item.appendChild(del);
        list.appendChild(item);
      }
      await loadMessages();
    }

    async function loadMessages() {
      const box = $("messages");
      box.innerHTML = "";
      if (!state.chat) {
        box.textContent = "Create a chat to get started.";
        return;
      }
      const data = await api("GET", "/api/chats/" + encodeURIComponent(state.chat));
      renderMessages(data.messages);
    }

    function renderMessages(messages) {
      const box = $("messages");
      box.innerHTML = "";
      messages.forEach((m, i) => {
        const div = document.createElement("div");
        div.className = "msg " + m.role;
        div.textContent = m.content;
        box.appendChild(div);
        if (m.role === "assistant" && i === messages.length - 1) {
          const fb = document.createElement("div");
          fb.className = "feedback";
          for (const [label, kind] of [["👍", "positive"], ["👎", "negative"]]) {
            const b = document.createElement("button");
            b.className = "secondary";
            b.textContent = label;
            b.onclick = async () => {
              await api("POST", "/api/feedback", { chat: state.chat, message_index: i, feedback: kind });
              fb.textContent = "Thanks for the feedback.";
            };
            fb.appendChild(b);
          }
          box.appendChild(fb);
        }
      });
      box.scrollTop = box.scrollHeight;
    }

    $("login-btn").onclick = () => authenticate("login");
    $("register-btn").onclick = () => authenticate("register");
    $("logout-btn").onclick = async () => {
      try { await api("POST", "/api/logout"); } catch (_) {}
      signOut();
    };

    $("new-chat-btn").onclick = async () => {
      const name = $("new-chat").value.trim();
      if (!name) return;
      try {
        await api("POST", "/api/chats", { name });
        state.chat = name;
        $("new-chat").value = "";
        loadChats();
      } catch (e) { alert(e.message); }
    };

    $("composer").onsubmit = async (ev) => {
      ev.preventDefault();
      const content = $("input").value.trim();
      if (!content || !state.chat) return;
      $("input").value = "";
      $("send-btn").disabled = true;
      try {
        const data = await api("POST", "/api/chats/" + encodeURIComponent(state.chat) + "/messages", { content });
        renderMessages(data.messages);
      } catch (e) { alert(e.message); }
      $("send-btn").disabled = false;
    };

    $("upload-btn").onclick = async () => {
      const file = $("file").files[0];
      if (!file) return;
      const form = new FormData();
      form.append("file", file);
      $("upload-status").textContent = "Processing " + file.name + "...";
      try {
        const data = await api("POST", "/api/documents", form);
        $("upload-status").textContent = data.filename + ": " + data.chunks + " chunks stored.";
      } catch (e) { $("upload-status").textContent = e.message; }
    };

    $("docs-btn").onclick = async () => {
      const data = await api("GET", "/api/documents");
      const rows = data.documents.map((d) =>
        "<tr><td>" + d.filename.replace(/</g, "&lt;") + "</td><td>" + d.file_type + "</td><td>" + d.uploaded_at + "</td></tr>").join("");
      $("messages").innerHTML = "<table><tr><th>File</th><th>Type</th><th>Uploaded</th></tr>" + rows + "</table>";
    };

    $("clear-btn").onclick = async () => {
      if (!confirm("Remove all uploaded documents?")) return;
      const data = await api("DELETE", "/api/documents");
      $("upload-status").textContent = data.removed + " documents removed.";
    };

    $("history-btn").onclick = async () => {
      if (!state.chat) return;
      const data = await api("GET", "/api/chats/" + encodeURIComponent(state.chat) + "/history");
      const box = $("messages");
      box.innerHTML = "";
      for (const it of data.interactions) {
        const div = document.createElement("div");
        div.className = "msg assistant";
        div.textContent = it.timestamp + "\nYou: " + it.user + "\nAssistant: " + it.assistant;
        box.appendChild(div);
      }
    };

    $("export-btn").onclick = async () => {
      if (!state.chat) return;
      try {
        const res = await api("GET", "/api/chats/" + encodeURIComponent(state.chat) + "/export", undefined, true);
        const blob = await res.blob();
        const a = document.createElement("a");
        a.href = URL.createObjectURL(blob);
        a.download = state.chat + ".csv";
        a.click();
      } catch (e) { alert(e.message); }
    };

    if (state.token) { showApp().catch(signOut); }
  </script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_page_wires_api_endpoints() {
        let html = render_index_page();
        assert!(html.contains("<title>docchat</title>"));
        assert!(!html.contains("{{TITLE}}"));
        for endpoint in ["/api/logout", "/api/chats", "/api/documents", "/api/feedback"] {
            assert!(html.contains(endpoint), "missing {}", endpoint);
        }
    }
}
